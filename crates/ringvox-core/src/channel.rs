//! Channels: named voice groups sharing one gain.
//!
//! A channel holds voice handles, not voices. The voices themselves live in
//! the manager's arena; a handle whose voice has been destroyed simply stops
//! resolving and is dropped on the next [`update`](Channel::update).

use tracing::debug;

use crate::VoiceHandle;
use crate::arena::Arena;
use crate::voice::{Device, Voice, VoiceState, accept_gain};

/// The fixed channel roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelId {
    /// Sound effects.
    Sound,
    /// Music.
    Music,
    /// Dialogue.
    Voice,
}

impl ChannelId {
    /// Every channel, in roster order.
    pub const ALL: [ChannelId; 3] = [ChannelId::Sound, ChannelId::Music, ChannelId::Voice];

    /// Lowercase channel name.
    pub fn name(self) -> &'static str {
        match self {
            ChannelId::Sound => "sound",
            ChannelId::Music => "music",
            ChannelId::Voice => "voice",
        }
    }

    /// Look up a channel by [`name`](Self::name).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A group of voices with a shared, unclamped gain.
#[derive(Debug)]
pub struct Channel {
    id: ChannelId,
    gain: f32,
    voices: Vec<VoiceHandle>,
    /// Voices this channel paused, for `resume`.
    paused: Vec<VoiceHandle>,
}

impl Channel {
    pub(crate) fn new(id: ChannelId, gain: f32) -> Self {
        Self {
            id,
            gain,
            voices: Vec::new(),
            paused: Vec::new(),
        }
    }

    /// Which channel this is.
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Channel gain.
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Handles currently tracked. Destroyed voices linger until the next update.
    pub fn handles(&self) -> &[VoiceHandle] {
        &self.voices
    }

    /// Number of tracked handles.
    pub fn len(&self) -> usize {
        self.voices.len()
    }

    /// Whether no handles are tracked.
    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    pub(crate) fn add(&mut self, handle: VoiceHandle) {
        self.voices.push(handle);
    }

    pub(crate) fn set_gain(&mut self, gain: f32, voices: &Arena<Voice>, device: &mut Device) {
        if !accept_gain("channel", gain) {
            return;
        }
        self.gain = gain;
        for &handle in &self.voices {
            if let Some(voice) = voices.get(handle) {
                voice.push_gain(device, gain);
            }
        }
    }

    /// Pause every playing voice and remember which ones they were.
    pub(crate) fn pause(&mut self, voices: &mut Arena<Voice>, device: &mut Device) {
        for &handle in &self.voices {
            if let Some(voice) = voices.get_mut(handle)
                && voice.state() == VoiceState::Playing
            {
                voice.pause(device);
                self.paused.push(handle);
            }
        }
    }

    /// Resume exactly the voices the last `pause` stopped.
    pub(crate) fn resume(&mut self, voices: &mut Arena<Voice>, device: &mut Device) {
        for handle in self.paused.drain(..) {
            if let Some(voice) = voices.get_mut(handle)
                && voice.state() == VoiceState::Paused
            {
                voice.play(device);
            }
        }
    }

    /// Finish every voice.
    pub(crate) fn stop(&mut self, voices: &mut Arena<Voice>, device: &mut Device) {
        for &handle in &self.voices {
            if let Some(voice) = voices.get_mut(handle) {
                voice.finish(device);
            }
        }
        self.paused.clear();
    }

    /// Update every live voice, then reap finished ones and expired handles.
    pub(crate) fn update(&mut self, dt: f32, voices: &mut Arena<Voice>, device: &mut Device) {
        let gain = self.gain;
        for &handle in &self.voices {
            if let Some(voice) = voices.get_mut(handle) {
                voice.update(device, dt, gain);
            }
        }
        self.voices.retain(|&handle| {
            let Some(voice) = voices.get(handle) else {
                return false;
            };
            if voice.state() != VoiceState::Finished {
                return true;
            }
            if let Some(voice) = voices.remove(handle) {
                voice.release(device);
            }
            debug!(%handle, channel = %self.id, "voice reaped");
            false
        });
        self.paused.retain(|&handle| voices.contains(handle));
    }
}
