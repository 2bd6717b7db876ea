//! Generation-checked slot storage for voices.
//!
//! A [`VoiceHandle`] stays valid until its voice is removed. Afterwards the
//! slot may be reused, but the reused slot carries a newer generation, so the
//! old handle resolves to nothing instead of aliasing the new voice.

/// Handle to a voice owned by a [`Manager`](crate::Manager).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceHandle {
    index: u32,
    generation: u32,
}

impl VoiceHandle {
    /// Slot index.
    pub fn index(self) -> u32 {
        self.index
    }

    /// Generation the slot had when this handle was issued.
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl std::fmt::Display for VoiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "voice#{}v{}", self.index, self.generation)
    }
}

#[derive(Debug)]
enum Slot<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32 },
}

#[derive(Debug)]
pub(crate) struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }
}

impl<T> Arena<T> {
    pub(crate) fn insert(&mut self, value: T) -> VoiceHandle {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            let generation = match slot {
                Slot::Vacant { generation } => generation.wrapping_add(1),
                Slot::Occupied { .. } => unreachable!("free list points at an occupied slot"),
            };
            *slot = Slot::Occupied { generation, value };
            return VoiceHandle { index, generation };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot::Occupied {
            generation: 0,
            value,
        });
        VoiceHandle {
            index,
            generation: 0,
        }
    }

    pub(crate) fn get(&self, handle: VoiceHandle) -> Option<&T> {
        match self.slots.get(handle.index as usize)? {
            Slot::Occupied { generation, value } if *generation == handle.generation => Some(value),
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self, handle: VoiceHandle) -> Option<&mut T> {
        match self.slots.get_mut(handle.index as usize)? {
            Slot::Occupied { generation, value } if *generation == handle.generation => Some(value),
            _ => None,
        }
    }

    pub(crate) fn contains(&self, handle: VoiceHandle) -> bool {
        self.get(handle).is_some()
    }

    pub(crate) fn remove(&mut self, handle: VoiceHandle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        match slot {
            Slot::Occupied { generation, .. } if *generation == handle.generation => {
                let vacant = Slot::Vacant {
                    generation: *generation,
                };
                let Slot::Occupied { value, .. } = std::mem::replace(slot, vacant) else {
                    return None;
                };
                self.free.push(handle.index);
                self.len -= 1;
                Some(value)
            }
            _ => None,
        }
    }

    /// Remove every value, oldest slot first.
    pub(crate) fn drain(&mut self) -> Vec<T> {
        let mut values = Vec::with_capacity(self.len);
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Slot::Occupied { generation, .. } = slot {
                let vacant = Slot::Vacant {
                    generation: *generation,
                };
                if let Slot::Occupied { value, .. } = std::mem::replace(slot, vacant) {
                    values.push(value);
                    self.free.push(index as u32);
                }
            }
        }
        self.len = 0;
        values
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let mut arena = Arena::default();
        let a = arena.insert("a");
        let b = arena.insert("b");
        assert_eq!(arena.get(a), Some(&"a"));
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.remove(a), Some("a"));
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.get(b), Some(&"b"));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_reused_slot_expires_old_handle() {
        let mut arena = Arena::default();
        let old = arena.insert(1);
        arena.remove(old);
        let new = arena.insert(2);
        assert_eq!(old.index(), new.index());
        assert_ne!(old.generation(), new.generation());
        assert!(!arena.contains(old));
        assert_eq!(arena.get(new), Some(&2));
        assert_eq!(arena.remove(old), None);
    }

    #[test]
    fn test_get_mut() {
        let mut arena = Arena::default();
        let h = arena.insert(10);
        *arena.get_mut(h).unwrap() += 5;
        assert_eq!(arena.get(h), Some(&15));
    }

    #[test]
    fn test_drain_empties_and_expires() {
        let mut arena = Arena::default();
        let a = arena.insert('a');
        let b = arena.insert('b');
        arena.remove(a);
        let c = arena.insert('c');
        assert_eq!(arena.drain(), vec!['c', 'b']);
        assert_eq!(arena.len(), 0);
        assert!(!arena.contains(b));
        assert!(!arena.contains(c));
    }

    #[test]
    fn test_out_of_range_handle() {
        let mut arena: Arena<u8> = Arena::default();
        let h = arena.insert(0);
        let mut other: Arena<u8> = Arena::default();
        assert!(other.get(h).is_none());
        assert!(other.get_mut(h).is_none());
    }
}
