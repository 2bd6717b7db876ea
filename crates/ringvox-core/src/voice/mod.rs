//! Voices: one playable sound bound to one backend source.
//!
//! Every voice carries the same common state (gain, pitch, 3D attributes,
//! effect routing, fade envelope) and one of three playback variants:
//!
//! - **Streaming**: decodes on the fly through a ring of backend buffers
//! - **Static**: plays a whole decoded clip from one shared buffer
//! - **Dummy**: no backend objects at all; finishes on its first update
//!
//! Dispatch is by variant tag. The gain sent to the backend is always
//! `channel gain × voice gain × fade gain`, recomputed whenever any of the
//! three changes.

mod static_voice;
mod streaming;

pub(crate) use static_voice::{StaticBuffer, StaticVoice};
pub use streaming::LoopRange;
pub(crate) use streaming::StreamingVoice;

use tracing::warn;

use crate::backend::{
    AudioBackend, BackendResult, EffectSlotId, FilterId, SourceId, SourceParam, Vec3,
};
use crate::fade::{Fade, FadeDirection};
use crate::{ChannelId, Error, Result, SampleFormat};

/// Backend slot shared by everything the manager owns; `None` in headless mode.
pub(crate) type Device = Option<Box<dyn AudioBackend>>;

/// Log a failed best-effort backend call.
pub(crate) fn warn_on_err(what: &str, result: BackendResult<()>) {
    if let Err(e) = result {
        warn!(error = %e, "{what} failed");
    }
}

/// Gains are finite and non-negative. Anything else is logged and dropped.
pub(crate) fn accept_gain(what: &str, gain: f32) -> bool {
    let ok = gain >= 0.0 && gain.is_finite();
    if !ok {
        warn!(gain, "ignoring invalid {what} gain");
    }
    ok
}

/// Playback state. `Finished` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    /// Created or paused; not consuming audio.
    Paused,
    /// Consuming audio.
    Playing,
    /// Done for good.
    Finished,
}

/// How a voice should be backed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Decode the whole asset into one (cached) buffer.
    Static,
    /// Decode incrementally through a buffer ring.
    Stream,
}

/// Caller-set parameters mirrored to the backend source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct VoiceParams {
    pub(crate) gain: f32,
    pub(crate) pitch: f32,
    pub(crate) position: Vec3,
    pub(crate) velocity: Vec3,
    pub(crate) reference_distance: f32,
    pub(crate) rolloff_factor: f32,
    pub(crate) relative: bool,
    pub(crate) direct_filter: Option<FilterId>,
    pub(crate) effect_send: (Option<EffectSlotId>, Option<FilterId>),
}

impl VoiceParams {
    pub(crate) fn new(reference_distance: f32, rolloff_factor: f32) -> Self {
        Self {
            gain: 1.0,
            pitch: 1.0,
            position: [0.0; 3],
            velocity: [0.0; 3],
            reference_distance,
            rolloff_factor,
            relative: false,
            direct_filter: None,
            effect_send: (None, None),
        }
    }

    fn store(&mut self, param: SourceParam) {
        match param {
            SourceParam::Gain(g) => self.gain = g,
            SourceParam::Pitch(p) => self.pitch = p,
            SourceParam::Position(v) => self.position = v,
            SourceParam::Velocity(v) => self.velocity = v,
            SourceParam::ReferenceDistance(d) => self.reference_distance = d,
            SourceParam::RolloffFactor(r) => self.rolloff_factor = r,
            SourceParam::Relative(r) => self.relative = r,
        }
    }
}

#[derive(Debug)]
pub(crate) enum VoiceKind {
    Dummy(VoiceState),
    Static(StaticVoice),
    Streaming(StreamingVoice),
}

#[derive(Debug)]
pub(crate) struct Voice {
    channel: ChannelId,
    params: VoiceParams,
    fade: Option<Fade>,
    fade_gain: f32,
    kind: VoiceKind,
}

impl Voice {
    pub(crate) fn new(channel: ChannelId, params: VoiceParams, kind: VoiceKind) -> Self {
        Self {
            channel,
            params,
            fade: None,
            fade_gain: 1.0,
            kind,
        }
    }

    pub(crate) fn dummy(channel: ChannelId, params: VoiceParams) -> Self {
        Self::new(channel, params, VoiceKind::Dummy(VoiceState::Paused))
    }

    pub(crate) fn channel(&self) -> ChannelId {
        self.channel
    }

    pub(crate) fn is_dummy(&self) -> bool {
        matches!(self.kind, VoiceKind::Dummy(_))
    }

    pub(crate) fn kind(&self) -> Option<SourceKind> {
        match self.kind {
            VoiceKind::Dummy(_) => None,
            VoiceKind::Static(_) => Some(SourceKind::Static),
            VoiceKind::Streaming(_) => Some(SourceKind::Stream),
        }
    }

    pub(crate) fn source_id(&self) -> Option<SourceId> {
        match &self.kind {
            VoiceKind::Dummy(_) => None,
            VoiceKind::Static(v) => Some(v.source()),
            VoiceKind::Streaming(v) => Some(v.source()),
        }
    }

    pub(crate) fn state(&self) -> VoiceState {
        match &self.kind {
            VoiceKind::Dummy(state) => *state,
            VoiceKind::Static(v) => v.state(),
            VoiceKind::Streaming(v) => v.state(),
        }
    }

    pub(crate) fn format(&self) -> Option<SampleFormat> {
        match &self.kind {
            VoiceKind::Dummy(_) => None,
            VoiceKind::Static(v) => Some(v.format()),
            VoiceKind::Streaming(v) => Some(v.format()),
        }
    }

    pub(crate) fn sample_duration(&self) -> u64 {
        match &self.kind {
            VoiceKind::Dummy(_) => 0,
            VoiceKind::Static(v) => v.total_samples(),
            VoiceKind::Streaming(v) => v.total_samples(),
        }
    }

    pub(crate) fn params(&self) -> &VoiceParams {
        &self.params
    }

    pub(crate) fn fade(&self) -> Option<&Fade> {
        self.fade.as_ref()
    }

    pub(crate) fn loop_range(&self) -> Option<LoopRange> {
        match &self.kind {
            VoiceKind::Streaming(v) => v.loop_range(),
            _ => None,
        }
    }

    pub(crate) fn effective_gain(&self, channel_gain: f32) -> f32 {
        channel_gain * self.params.gain * self.fade_gain
    }

    /// Push every stored parameter to a freshly created source.
    pub(crate) fn apply_all(&self, device: &mut Device, channel_gain: f32) {
        let (Some(source), Some(backend)) = (self.source_id(), device.as_deref_mut()) else {
            return;
        };
        let p = &self.params;
        for param in [
            SourceParam::Gain(self.effective_gain(channel_gain)),
            SourceParam::Pitch(p.pitch),
            SourceParam::Position(p.position),
            SourceParam::Velocity(p.velocity),
            SourceParam::ReferenceDistance(p.reference_distance),
            SourceParam::RolloffFactor(p.rolloff_factor),
            SourceParam::Relative(p.relative),
        ] {
            warn_on_err("set source parameter", backend.set_param(source, param));
        }
    }

    pub(crate) fn push_gain(&self, device: &mut Device, channel_gain: f32) {
        if let (Some(source), Some(backend)) = (self.source_id(), device.as_deref_mut()) {
            let gain = SourceParam::Gain(self.effective_gain(channel_gain));
            warn_on_err("set gain", backend.set_param(source, gain));
        }
    }

    /// Store and forward one parameter. Gain goes through the cascade.
    pub(crate) fn set_param(&mut self, device: &mut Device, param: SourceParam, channel_gain: f32) {
        if self.is_dummy() {
            return;
        }
        if let SourceParam::Gain(g) = param
            && !accept_gain("voice", g)
        {
            return;
        }
        self.params.store(param);
        if let SourceParam::Gain(_) = param {
            self.push_gain(device, channel_gain);
        } else if let (Some(source), Some(backend)) = (self.source_id(), device.as_deref_mut()) {
            warn_on_err("set source parameter", backend.set_param(source, param));
        }
    }

    pub(crate) fn set_direct_filter(&mut self, device: &mut Device, filter: Option<FilterId>) {
        if self.is_dummy() {
            return;
        }
        self.params.direct_filter = filter;
        if let (Some(source), Some(backend)) = (self.source_id(), device.as_deref_mut()) {
            warn_on_err("set direct filter", backend.set_direct_filter(source, filter));
        }
    }

    pub(crate) fn set_effect_send(
        &mut self,
        device: &mut Device,
        slot: Option<EffectSlotId>,
        filter: Option<FilterId>,
    ) {
        if self.is_dummy() {
            return;
        }
        self.params.effect_send = (slot, filter);
        if let (Some(source), Some(backend)) = (self.source_id(), device.as_deref_mut()) {
            warn_on_err("set effect send", backend.set_effect_send(source, slot, filter));
        }
    }

    /// Arm a fade, replacing any running one.
    pub(crate) fn set_fading(
        &mut self,
        device: &mut Device,
        direction: FadeDirection,
        duration: f32,
        channel_gain: f32,
    ) {
        if self.is_dummy() || self.state() == VoiceState::Finished {
            return;
        }
        let fade = Fade::new(direction, duration);
        self.fade_gain = fade.gain();
        self.fade = Some(fade);
        self.push_gain(device, channel_gain);
    }

    pub(crate) fn play(&mut self, device: &mut Device) {
        match (&mut self.kind, device.as_deref_mut()) {
            (VoiceKind::Dummy(state), _) => {
                if *state == VoiceState::Paused {
                    *state = VoiceState::Playing;
                }
            }
            (VoiceKind::Static(v), Some(backend)) => v.play(backend),
            (VoiceKind::Streaming(v), Some(backend)) => v.play(backend),
            _ => {}
        }
    }

    pub(crate) fn pause(&mut self, device: &mut Device) {
        match (&mut self.kind, device.as_deref_mut()) {
            (VoiceKind::Dummy(state), _) => {
                if *state == VoiceState::Playing {
                    *state = VoiceState::Paused;
                }
            }
            (VoiceKind::Static(v), Some(backend)) => v.pause(backend),
            (VoiceKind::Streaming(v), Some(backend)) => v.pause(backend),
            _ => {}
        }
    }

    pub(crate) fn finish(&mut self, device: &mut Device) {
        self.fade = None;
        match (&mut self.kind, device.as_deref_mut()) {
            (VoiceKind::Dummy(state), _) => *state = VoiceState::Finished,
            (VoiceKind::Static(v), Some(backend)) => v.finish(backend),
            (VoiceKind::Streaming(v), Some(backend)) => v.finish(backend),
            _ => {}
        }
    }

    /// Advance the fade, then service the playback variant.
    pub(crate) fn update(&mut self, device: &mut Device, dt: f32, channel_gain: f32) {
        if let VoiceKind::Dummy(state) = &mut self.kind {
            *state = VoiceState::Finished;
            return;
        }
        if self.state() == VoiceState::Playing {
            if let Some(fade) = self.fade.as_mut() {
                let step = fade.advance(dt);
                let direction = fade.direction();
                self.fade_gain = step.gain;
                self.push_gain(device, channel_gain);
                if step.complete {
                    self.fade = None;
                    if direction == FadeDirection::Out {
                        self.finish(device);
                        return;
                    }
                }
            }
        }
        match (&mut self.kind, device.as_deref_mut()) {
            (VoiceKind::Static(v), Some(backend)) => v.update(backend),
            (VoiceKind::Streaming(v), Some(backend)) => v.update(backend),
            _ => {}
        }
    }

    pub(crate) fn seek_to_sample(&mut self, device: &mut Device, sample: u64) -> Result<()> {
        match (&mut self.kind, device.as_deref_mut()) {
            (VoiceKind::Static(v), Some(backend)) => v.seek_to_sample(backend, sample),
            (VoiceKind::Streaming(v), Some(backend)) => v.seek_to_sample(backend, sample),
            _ => Ok(()),
        }
    }

    pub(crate) fn sample_pos(&self, device: &Device) -> u64 {
        match (&self.kind, device.as_deref()) {
            (VoiceKind::Static(v), Some(backend)) => v.sample_pos(backend),
            (VoiceKind::Streaming(v), Some(backend)) => v.sample_pos(backend),
            _ => 0,
        }
    }

    pub(crate) fn cursor_pos(&self, device: &Device) -> u64 {
        match (&self.kind, device.as_deref()) {
            (VoiceKind::Streaming(v), Some(backend)) => v.cursor_pos(backend),
            _ => self.sample_pos(device),
        }
    }

    pub(crate) fn set_loop(&mut self, begin: u64, end: u64) -> Result<()> {
        match &mut self.kind {
            VoiceKind::Dummy(_) => Ok(()),
            VoiceKind::Static(_) => Err(Error::Unsupported("loop ranges on static voices")),
            VoiceKind::Streaming(v) => v.set_loop(begin, end),
        }
    }

    pub(crate) fn set_looping(&mut self, device: &mut Device, looping: bool) -> Result<()> {
        match (&mut self.kind, device.as_deref_mut()) {
            (VoiceKind::Static(v), Some(backend)) => {
                v.set_looping(backend, looping);
                Ok(())
            }
            (VoiceKind::Streaming(v), _) => v.set_looping(looping),
            _ => Ok(()),
        }
    }

    /// Give every backend object back.
    pub(crate) fn release(self, device: &mut Device) {
        match (self.kind, device.as_deref_mut()) {
            (VoiceKind::Static(v), Some(backend)) => v.release(backend),
            (VoiceKind::Streaming(v), Some(backend)) => v.release(backend),
            _ => {}
        }
    }
}
