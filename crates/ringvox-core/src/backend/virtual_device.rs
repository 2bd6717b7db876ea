//! A deterministic software device.
//!
//! [`VirtualBackend`] implements the full [`AudioBackend`] contract without
//! producing sound. Sources consume their queued buffers as
//! [`update`](AudioBackend::update) advances a virtual clock by
//! `dt * pitch` seconds at each buffer's own sample rate, so processed counts,
//! offsets and underruns behave like a real device running at exactly the
//! rate the caller ticks it. The clock has microsecond resolution.
//!
//! The handle is cheap to clone and every clone talks to the same device. Keep
//! one clone for inspection after handing another to the
//! [`Manager`](crate::Manager).

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;

use super::{
    AudioBackend, BackendResult, BufferId, EffectId, EffectKind, EffectSlotId, FilterId,
    FilterKind, FilterParams, Listener, SourceId, SourceParam, Transport, TransportState, Vec3,
};
use crate::{BackendError, SampleFormat};

/// Snapshot of a source's scalar and vector parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceParams {
    /// Linear gain.
    pub gain: f32,
    /// Playback rate multiplier.
    pub pitch: f32,
    /// Position.
    pub position: Vec3,
    /// Velocity.
    pub velocity: Vec3,
    /// Reference distance.
    pub reference_distance: f32,
    /// Rolloff factor.
    pub rolloff_factor: f32,
    /// Listener-relative positioning.
    pub relative: bool,
}

impl Default for SourceParams {
    fn default() -> Self {
        Self {
            gain: 1.0,
            pitch: 1.0,
            position: [0.0; 3],
            velocity: [0.0; 3],
            reference_distance: 1.0,
            rolloff_factor: 1.0,
            relative: false,
        }
    }
}

/// Slack, in frames, absorbed when comparing the float playback cursor.
const CURSOR_EPSILON: f64 = 1e-6;

#[derive(Debug, Default)]
struct BufferObject {
    pcm: Vec<u8>,
    format: Option<SampleFormat>,
}

impl BufferObject {
    fn frames(&self) -> u64 {
        self.format
            .map(|f| f.bytes_to_frames(self.pcm.len() as u64))
            .unwrap_or(0)
    }

    fn rate(&self) -> f64 {
        self.format.map(|f| f64::from(f.rate)).unwrap_or(0.0)
    }
}

#[derive(Debug)]
struct SourceObject {
    transport: TransportState,
    queue: VecDeque<BufferId>,
    processed: usize,
    /// Frames into `queue[processed]`, or into the attached buffer.
    cursor: f64,
    attached: Option<BufferId>,
    looping: bool,
    rewound: bool,
    offset_pending: bool,
    params: SourceParams,
    direct_filter: Option<FilterId>,
    effect_send: (Option<EffectSlotId>, Option<FilterId>),
    play_commands: usize,
}

impl Default for SourceObject {
    fn default() -> Self {
        Self {
            transport: TransportState::Initial,
            queue: VecDeque::new(),
            processed: 0,
            cursor: 0.0,
            attached: None,
            looping: false,
            rewound: false,
            offset_pending: false,
            params: SourceParams::default(),
            direct_filter: None,
            effect_send: (None, None),
            play_commands: 0,
        }
    }
}

#[derive(Debug, Default)]
struct Device {
    next_id: u32,
    clock: f64,
    buffers: HashMap<BufferId, BufferObject>,
    sources: HashMap<SourceId, SourceObject>,
    filters: HashMap<FilterId, (FilterKind, FilterParams)>,
    effects: HashMap<EffectId, (EffectKind, BTreeMap<u32, f32>)>,
    slots: HashMap<EffectSlotId, Option<EffectId>>,
    listener: Listener,
    fail_source_creation: bool,
    fail_buffer_creation: bool,
    fail_uploads: bool,
    buffers_created: usize,
    sources_created: usize,
}

impl Device {
    fn alloc_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn source(&self, id: SourceId) -> BackendResult<&SourceObject> {
        self.sources.get(&id).ok_or(BackendError::InvalidHandle {
            kind: "source",
            id: id.0,
        })
    }

    fn source_mut(&mut self, id: SourceId) -> BackendResult<&mut SourceObject> {
        self.sources.get_mut(&id).ok_or(BackendError::InvalidHandle {
            kind: "source",
            id: id.0,
        })
    }

    fn check_buffer(&self, id: BufferId) -> BackendResult<&BufferObject> {
        self.buffers.get(&id).ok_or(BackendError::InvalidHandle {
            kind: "buffer",
            id: id.0,
        })
    }

    fn check_filter(&self, id: Option<FilterId>) -> BackendResult<()> {
        match id {
            Some(id) if !self.filters.contains_key(&id) => Err(BackendError::InvalidHandle {
                kind: "filter",
                id: id.0,
            }),
            _ => Ok(()),
        }
    }

    fn buffer_in_use(&self, id: BufferId) -> bool {
        self.sources
            .values()
            .any(|s| s.attached == Some(id) || s.queue.contains(&id))
    }

    fn frames_of(&self, id: BufferId) -> u64 {
        self.buffers.get(&id).map(BufferObject::frames).unwrap_or(0)
    }

    fn advance(&mut self, dt: f64) {
        self.clock += dt;
        let buffers = &self.buffers;
        for source in self.sources.values_mut() {
            if source.transport != TransportState::Playing {
                continue;
            }
            let pitch = f64::from(source.params.pitch);
            if pitch <= 0.0 {
                continue;
            }
            let mut secs = dt * pitch;
            if let Some(id) = source.attached {
                let (frames, rate) = buffers
                    .get(&id)
                    .map(|b| (b.frames() as f64, b.rate()))
                    .unwrap_or((0.0, 0.0));
                source.cursor += secs * rate;
                if source.cursor + CURSOR_EPSILON >= frames {
                    if source.looping && frames > 0.0 {
                        source.cursor %= frames;
                    } else {
                        source.cursor = 0.0;
                        source.transport = TransportState::Stopped;
                    }
                }
                continue;
            }
            while source.processed < source.queue.len() {
                let (frames, rate) = buffers
                    .get(&source.queue[source.processed])
                    .map(|b| (b.frames() as f64, b.rate()))
                    .unwrap_or((0.0, 0.0));
                if rate > 0.0 && source.cursor + secs * rate + CURSOR_EPSILON < frames {
                    source.cursor += secs * rate;
                    break;
                }
                if rate > 0.0 {
                    secs = (secs - (frames - source.cursor) / rate).max(0.0);
                }
                source.cursor = 0.0;
                source.processed += 1;
            }
            if source.processed == source.queue.len() {
                source.transport = TransportState::Stopped;
                source.rewound = false;
            }
        }
    }
}

/// Simulated output device with inspection and fault injection.
#[derive(Debug, Clone, Default)]
pub struct VirtualBackend {
    device: Rc<RefCell<Device>>,
}

impl VirtualBackend {
    /// Create a device with an empty object table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds advanced so far.
    pub fn clock(&self) -> f64 {
        self.device.borrow().clock
    }

    /// Make every later `create_source` fail.
    pub fn set_fail_source_creation(&self, fail: bool) {
        self.device.borrow_mut().fail_source_creation = fail;
    }

    /// Make every later `create_buffer` fail.
    pub fn set_fail_buffer_creation(&self, fail: bool) {
        self.device.borrow_mut().fail_buffer_creation = fail;
    }

    /// Make every later `upload` fail.
    pub fn set_fail_uploads(&self, fail: bool) {
        self.device.borrow_mut().fail_uploads = fail;
    }

    /// Buffer objects currently allocated.
    pub fn live_buffers(&self) -> usize {
        self.device.borrow().buffers.len()
    }

    /// Source objects currently allocated.
    pub fn live_sources(&self) -> usize {
        self.device.borrow().sources.len()
    }

    /// Buffer objects ever allocated.
    pub fn buffers_created(&self) -> usize {
        self.device.borrow().buffers_created
    }

    /// Source objects ever allocated.
    pub fn sources_created(&self) -> usize {
        self.device.borrow().sources_created
    }

    /// Filters, effects and effect slots currently allocated.
    pub fn live_effect_objects(&self) -> usize {
        let device = self.device.borrow();
        device.filters.len() + device.effects.len() + device.slots.len()
    }

    /// Whether `buffer` is still allocated.
    pub fn buffer_exists(&self, buffer: BufferId) -> bool {
        self.device.borrow().buffers.contains_key(&buffer)
    }

    /// Copy of the PCM last uploaded to `buffer`.
    pub fn buffer_pcm(&self, buffer: BufferId) -> Option<Vec<u8>> {
        self.device.borrow().buffers.get(&buffer).map(|b| b.pcm.clone())
    }

    /// The source's queue, oldest first, processed buffers included.
    pub fn queued_buffers(&self, source: SourceId) -> Vec<BufferId> {
        self.device
            .borrow()
            .sources
            .get(&source)
            .map(|s| s.queue.iter().copied().collect())
            .unwrap_or_default()
    }

    /// The buffer bound for static playback.
    pub fn attached_buffer(&self, source: SourceId) -> Option<BufferId> {
        self.device.borrow().sources.get(&source)?.attached
    }

    /// Parameters last set on `source`.
    pub fn source_params(&self, source: SourceId) -> Option<SourceParams> {
        self.device.borrow().sources.get(&source).map(|s| s.params)
    }

    /// Gain last set on `source`.
    pub fn source_gain(&self, source: SourceId) -> Option<f32> {
        self.source_params(source).map(|p| p.gain)
    }

    /// Direct filter routed on `source`.
    pub fn direct_filter(&self, source: SourceId) -> Option<FilterId> {
        self.device.borrow().sources.get(&source)?.direct_filter
    }

    /// Effect send routed on `source`.
    pub fn effect_send(&self, source: SourceId) -> (Option<EffectSlotId>, Option<FilterId>) {
        self.device
            .borrow()
            .sources
            .get(&source)
            .map(|s| s.effect_send)
            .unwrap_or((None, None))
    }

    /// How many `Play` commands `source` has received.
    pub fn play_commands(&self, source: SourceId) -> usize {
        self.device
            .borrow()
            .sources
            .get(&source)
            .map(|s| s.play_commands)
            .unwrap_or(0)
    }

    /// Listener state.
    pub fn listener(&self) -> Listener {
        self.device.borrow().listener
    }

    /// Effect loaded in `slot`.
    pub fn slot_effect(&self, slot: EffectSlotId) -> Option<EffectId> {
        self.device.borrow().slots.get(&slot).copied().flatten()
    }
}

impl AudioBackend for VirtualBackend {
    fn name(&self) -> &str {
        "virtual"
    }

    fn create_buffer(&mut self) -> BackendResult<BufferId> {
        let mut device = self.device.borrow_mut();
        if device.fail_buffer_creation {
            return Err(BackendError::OutOfResources("buffer"));
        }
        let id = BufferId(device.alloc_id());
        device.buffers.insert(id, BufferObject::default());
        device.buffers_created += 1;
        Ok(id)
    }

    fn delete_buffer(&mut self, buffer: BufferId) -> BackendResult<()> {
        let mut device = self.device.borrow_mut();
        device.check_buffer(buffer)?;
        if device.fail_uploads {
            return Err(BackendError::DeviceLost);
        }
        if device.buffer_in_use(buffer) {
            return Err(BackendError::InUse("buffer"));
        }
        device.buffers.remove(&buffer);
        Ok(())
    }

    fn upload(
        &mut self,
        buffer: BufferId,
        pcm: &[u8],
        format: SampleFormat,
    ) -> BackendResult<()> {
        let mut device = self.device.borrow_mut();
        device.check_buffer(buffer)?;
        if device.buffer_in_use(buffer) {
            return Err(BackendError::InUse("buffer"));
        }
        format
            .validate_for_playback()
            .map_err(|e| BackendError::Rejected(e.to_string()))?;
        if pcm.len() % format.bytes_per_frame() != 0 {
            return Err(BackendError::Rejected(format!(
                "{} bytes is not a whole number of frames",
                pcm.len()
            )));
        }
        if let Some(object) = device.buffers.get_mut(&buffer) {
            object.pcm.clear();
            object.pcm.extend_from_slice(pcm);
            object.format = Some(format);
        }
        Ok(())
    }

    fn create_source(&mut self) -> BackendResult<SourceId> {
        let mut device = self.device.borrow_mut();
        if device.fail_source_creation {
            return Err(BackendError::OutOfResources("source"));
        }
        let id = SourceId(device.alloc_id());
        device.sources.insert(id, SourceObject::default());
        device.sources_created += 1;
        Ok(id)
    }

    fn delete_source(&mut self, source: SourceId) -> BackendResult<()> {
        let mut device = self.device.borrow_mut();
        device.source(source)?;
        device.sources.remove(&source);
        Ok(())
    }

    fn attach_buffer(
        &mut self,
        source: SourceId,
        buffer: Option<BufferId>,
    ) -> BackendResult<()> {
        let mut device = self.device.borrow_mut();
        if let Some(buffer) = buffer {
            device.check_buffer(buffer)?;
        }
        let object = device.source_mut(source)?;
        if !object.queue.is_empty() {
            return Err(BackendError::InUse("source queue"));
        }
        object.attached = buffer;
        object.cursor = 0.0;
        object.transport = TransportState::Initial;
        Ok(())
    }

    fn enqueue(&mut self, source: SourceId, buffer: BufferId) -> BackendResult<()> {
        let mut device = self.device.borrow_mut();
        let format = device.check_buffer(buffer)?.format;
        let head_format = device
            .source(source)?
            .queue
            .front()
            .and_then(|id| device.buffers.get(id))
            .and_then(|b| b.format);
        if head_format.is_some() && head_format != format {
            return Err(BackendError::Rejected("queued buffer format mismatch".into()));
        }
        let object = device.source_mut(source)?;
        if object.attached.is_some() {
            return Err(BackendError::InUse("attached buffer"));
        }
        object.queue.push_back(buffer);
        Ok(())
    }

    fn dequeue_processed(&mut self, source: SourceId) -> BackendResult<Vec<BufferId>> {
        let mut device = self.device.borrow_mut();
        let object = device.source_mut(source)?;
        let done: Vec<BufferId> = object.queue.drain(..object.processed).collect();
        object.processed = 0;
        Ok(done)
    }

    fn queued_count(&self, source: SourceId) -> usize {
        self.device
            .borrow()
            .sources
            .get(&source)
            .map(|s| s.queue.len())
            .unwrap_or(0)
    }

    fn processed_count(&self, source: SourceId) -> usize {
        self.device
            .borrow()
            .sources
            .get(&source)
            .map(|s| s.processed)
            .unwrap_or(0)
    }

    fn set_transport(&mut self, source: SourceId, transport: Transport) -> BackendResult<()> {
        let mut device = self.device.borrow_mut();
        let object = device.source_mut(source)?;
        match transport {
            Transport::Play => {
                object.play_commands += 1;
                match object.transport {
                    TransportState::Playing => {}
                    TransportState::Paused => object.transport = TransportState::Playing,
                    TransportState::Initial | TransportState::Stopped => {
                        object.processed = 0;
                        if !object.offset_pending {
                            object.cursor = 0.0;
                        }
                        object.offset_pending = false;
                        object.rewound = false;
                        object.transport = if object.queue.is_empty() && object.attached.is_none()
                        {
                            TransportState::Stopped
                        } else {
                            TransportState::Playing
                        };
                    }
                }
            }
            Transport::Pause => {
                if object.transport == TransportState::Playing {
                    object.transport = TransportState::Paused;
                }
            }
            Transport::Stop => {
                object.transport = TransportState::Stopped;
                object.processed = object.queue.len();
                object.cursor = 0.0;
                object.rewound = true;
                object.offset_pending = false;
            }
        }
        Ok(())
    }

    fn transport_state(&self, source: SourceId) -> TransportState {
        self.device
            .borrow()
            .sources
            .get(&source)
            .map(|s| s.transport)
            .unwrap_or(TransportState::Initial)
    }

    fn sample_offset(&self, source: SourceId) -> u64 {
        let device = self.device.borrow();
        let Some(object) = device.sources.get(&source) else {
            return 0;
        };
        if object.rewound {
            return 0;
        }
        let played: u64 = object
            .queue
            .iter()
            .take(object.processed)
            .map(|id| device.frames_of(*id))
            .sum();
        played + (object.cursor + CURSOR_EPSILON) as u64
    }

    fn set_sample_offset(&mut self, source: SourceId, offset: u64) -> BackendResult<()> {
        let mut device = self.device.borrow_mut();
        let frames = device
            .source(source)?
            .attached
            .map(|id| device.frames_of(id))
            .ok_or(BackendError::Rejected("no buffer attached".into()))?;
        if offset > frames {
            return Err(BackendError::Rejected(format!(
                "offset {offset} past end of {frames}-frame buffer"
            )));
        }
        let object = device.source_mut(source)?;
        object.cursor = offset as f64;
        object.rewound = false;
        object.offset_pending = matches!(
            object.transport,
            TransportState::Initial | TransportState::Stopped
        );
        Ok(())
    }

    fn set_looping(&mut self, source: SourceId, looping: bool) -> BackendResult<()> {
        self.device.borrow_mut().source_mut(source)?.looping = looping;
        Ok(())
    }

    fn set_param(&mut self, source: SourceId, param: SourceParam) -> BackendResult<()> {
        let mut device = self.device.borrow_mut();
        let params = &mut device.source_mut(source)?.params;
        match param {
            SourceParam::Gain(g) if g < 0.0 || g.is_nan() => {
                return Err(BackendError::Rejected(format!("gain {g}")));
            }
            SourceParam::Gain(g) => params.gain = g,
            SourceParam::Pitch(p) if p <= 0.0 || p.is_nan() => {
                return Err(BackendError::Rejected(format!("pitch {p}")));
            }
            SourceParam::Pitch(p) => params.pitch = p,
            SourceParam::Position(v) => params.position = v,
            SourceParam::Velocity(v) => params.velocity = v,
            SourceParam::ReferenceDistance(d) => params.reference_distance = d,
            SourceParam::RolloffFactor(r) => params.rolloff_factor = r,
            SourceParam::Relative(r) => params.relative = r,
        }
        Ok(())
    }

    fn set_direct_filter(
        &mut self,
        source: SourceId,
        filter: Option<FilterId>,
    ) -> BackendResult<()> {
        let mut device = self.device.borrow_mut();
        device.check_filter(filter)?;
        device.source_mut(source)?.direct_filter = filter;
        Ok(())
    }

    fn set_effect_send(
        &mut self,
        source: SourceId,
        slot: Option<EffectSlotId>,
        filter: Option<FilterId>,
    ) -> BackendResult<()> {
        let mut device = self.device.borrow_mut();
        device.check_filter(filter)?;
        if let Some(slot) = slot {
            if !device.slots.contains_key(&slot) {
                return Err(BackendError::InvalidHandle {
                    kind: "effect slot",
                    id: slot.0,
                });
            }
        }
        device.source_mut(source)?.effect_send = (slot, filter);
        Ok(())
    }

    fn set_listener_gain(&mut self, gain: f32) -> BackendResult<()> {
        if gain < 0.0 || gain.is_nan() {
            return Err(BackendError::Rejected(format!("listener gain {gain}")));
        }
        self.device.borrow_mut().listener.gain = gain;
        Ok(())
    }

    fn set_listener_position(&mut self, position: Vec3) -> BackendResult<()> {
        self.device.borrow_mut().listener.position = position;
        Ok(())
    }

    fn set_listener_velocity(&mut self, velocity: Vec3) -> BackendResult<()> {
        self.device.borrow_mut().listener.velocity = velocity;
        Ok(())
    }

    fn set_listener_orientation(&mut self, at: Vec3, up: Vec3) -> BackendResult<()> {
        let mut device = self.device.borrow_mut();
        device.listener.at = at;
        device.listener.up = up;
        Ok(())
    }

    fn create_filter(&mut self, kind: FilterKind) -> BackendResult<FilterId> {
        let mut device = self.device.borrow_mut();
        let id = FilterId(device.alloc_id());
        device.filters.insert(id, (kind, FilterParams::default()));
        Ok(id)
    }

    fn set_filter_params(&mut self, filter: FilterId, params: FilterParams) -> BackendResult<()> {
        let mut device = self.device.borrow_mut();
        let entry = device
            .filters
            .get_mut(&filter)
            .ok_or(BackendError::InvalidHandle {
                kind: "filter",
                id: filter.0,
            })?;
        entry.1 = params;
        Ok(())
    }

    fn delete_filter(&mut self, filter: FilterId) -> BackendResult<()> {
        self.device
            .borrow_mut()
            .filters
            .remove(&filter)
            .map(|_| ())
            .ok_or(BackendError::InvalidHandle {
                kind: "filter",
                id: filter.0,
            })
    }

    fn create_effect(&mut self, kind: EffectKind) -> BackendResult<EffectId> {
        let mut device = self.device.borrow_mut();
        let id = EffectId(device.alloc_id());
        device.effects.insert(id, (kind, BTreeMap::new()));
        Ok(id)
    }

    fn set_effect_param(&mut self, effect: EffectId, index: u32, value: f32) -> BackendResult<()> {
        let mut device = self.device.borrow_mut();
        let entry = device
            .effects
            .get_mut(&effect)
            .ok_or(BackendError::InvalidHandle {
                kind: "effect",
                id: effect.0,
            })?;
        entry.1.insert(index, value);
        Ok(())
    }

    fn delete_effect(&mut self, effect: EffectId) -> BackendResult<()> {
        let mut device = self.device.borrow_mut();
        device
            .effects
            .remove(&effect)
            .ok_or(BackendError::InvalidHandle {
                kind: "effect",
                id: effect.0,
            })?;
        for loaded in device.slots.values_mut() {
            if *loaded == Some(effect) {
                *loaded = None;
            }
        }
        Ok(())
    }

    fn create_effect_slot(&mut self) -> BackendResult<EffectSlotId> {
        let mut device = self.device.borrow_mut();
        let id = EffectSlotId(device.alloc_id());
        device.slots.insert(id, None);
        Ok(id)
    }

    fn attach_effect(
        &mut self,
        slot: EffectSlotId,
        effect: Option<EffectId>,
    ) -> BackendResult<()> {
        let mut device = self.device.borrow_mut();
        if let Some(effect) = effect {
            if !device.effects.contains_key(&effect) {
                return Err(BackendError::InvalidHandle {
                    kind: "effect",
                    id: effect.0,
                });
            }
        }
        let loaded = device
            .slots
            .get_mut(&slot)
            .ok_or(BackendError::InvalidHandle {
                kind: "effect slot",
                id: slot.0,
            })?;
        *loaded = effect;
        Ok(())
    }

    fn delete_effect_slot(&mut self, slot: EffectSlotId) -> BackendResult<()> {
        let mut device = self.device.borrow_mut();
        device
            .slots
            .remove(&slot)
            .ok_or(BackendError::InvalidHandle {
                kind: "effect slot",
                id: slot.0,
            })?;
        for source in device.sources.values_mut() {
            if source.effect_send.0 == Some(slot) {
                source.effect_send = (None, None);
            }
        }
        Ok(())
    }

    fn update(&mut self, dt: f32) {
        // the virtual clock ticks in whole microseconds
        let dt = (f64::from(dt) * 1e6).round() / 1e6;
        self.device.borrow_mut().advance(dt.max(0.0));
    }
}
