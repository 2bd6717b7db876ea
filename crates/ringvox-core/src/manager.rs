//! The voice manager: owner of every voice, channel and backend object.
//!
//! The manager is the engine's only public entry point for playback. It
//! creates voices from asset names, routes them into channels, keeps decoded
//! static assets cached, and ticks everything from [`Manager::update`].
//!
//! Voice creation never fails from the caller's point of view. When the asset
//! cannot be opened or the backend runs out of objects, the failure is logged,
//! handed to the optional load-error hook, and the caller gets a dummy voice
//! that accepts every call and finishes on the next update.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::arena::Arena;
use crate::backend::{
    AudioBackend, EffectId, EffectKind, EffectSlotId, FilterId, FilterKind, FilterParams,
    Listener, SourceId, SourceParam, Vec3,
};
use crate::channel::{Channel, ChannelId};
use crate::fade::{Fade, FadeDirection};
use crate::voice::{
    Device, LoopRange, SourceKind, StaticBuffer, StaticVoice, StreamingVoice, Voice, VoiceKind,
    VoiceParams, VoiceState, accept_gain, warn_on_err,
};
use crate::{AssetOpener, EngineConfig, Error, PcmSource, Result, SampleFormat, VoiceHandle};

/// Callback told about every voice that fell back to a dummy.
///
/// The path is `None` for voices created from an already-open source.
pub type LoadErrorHook = Box<dyn FnMut(Option<&Path>, &Error)>;

/// Owns voices, channels, the static buffer cache and effect objects.
pub struct Manager {
    device: Device,
    opener: Box<dyn AssetOpener>,
    config: EngineConfig,
    voices: Arena<Voice>,
    channels: [Channel; 3],
    cache: HashMap<PathBuf, Rc<StaticBuffer>>,
    listener: Listener,
    filters: Vec<FilterId>,
    effects: Vec<EffectId>,
    slots: Vec<EffectSlotId>,
    load_error_hook: Option<LoadErrorHook>,
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("backend", &self.backend_name())
            .field("voices", &self.voices.len())
            .field("cached", &self.cache.len())
            .field("channels", &self.channels)
            .finish_non_exhaustive()
    }
}

impl Manager {
    /// Create a manager driving `backend`.
    pub fn new(
        backend: Box<dyn AudioBackend>,
        opener: impl AssetOpener + 'static,
        config: EngineConfig,
    ) -> Self {
        Self::build(Some(backend), Box::new(opener), config)
    }

    /// Create a manager without a device. Every voice is a dummy.
    pub fn headless(opener: impl AssetOpener + 'static, config: EngineConfig) -> Self {
        Self::build(None, Box::new(opener), config)
    }

    fn build(device: Device, opener: Box<dyn AssetOpener>, mut config: EngineConfig) -> Self {
        if let Err(e) = config.validate() {
            warn!(error = %e, "invalid engine config, using defaults");
            config = EngineConfig::default();
        }
        let channels = ChannelId::ALL.map(|id| Channel::new(id, config.channels.get(id)));
        let listener = Listener {
            gain: config.master_gain,
            ..Listener::default()
        };
        let mut manager = Self {
            device,
            opener,
            config,
            voices: Arena::default(),
            channels,
            cache: HashMap::new(),
            listener,
            filters: Vec::new(),
            effects: Vec::new(),
            slots: Vec::new(),
            load_error_hook: None,
        };
        manager.push_listener();
        match manager.backend_name() {
            Some(name) => info!(backend = name, "voice manager started"),
            None => info!("voice manager started without a device"),
        }
        manager
    }

    fn push_listener(&mut self) {
        let l = self.listener;
        if let Some(backend) = self.device.as_deref_mut() {
            warn_on_err("set listener gain", backend.set_listener_gain(l.gain));
            warn_on_err("set listener position", backend.set_listener_position(l.position));
            warn_on_err("set listener velocity", backend.set_listener_velocity(l.velocity));
            warn_on_err(
                "set listener orientation",
                backend.set_listener_orientation(l.at, l.up),
            );
        }
    }

    /// Whether the manager runs without a device.
    pub fn is_headless(&self) -> bool {
        self.device.is_none()
    }

    /// Name of the backend, if any.
    pub fn backend_name(&self) -> Option<&str> {
        self.device.as_deref().map(AudioBackend::name)
    }

    /// Settings the manager was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Install the callback told about voices that fell back to a dummy.
    pub fn set_load_error_hook(&mut self, hook: impl FnMut(Option<&Path>, &Error) + 'static) {
        self.load_error_hook = Some(Box::new(hook));
    }

    fn report(&mut self, asset: Option<&Path>, error: &Error) {
        match asset {
            Some(path) => warn!(
                asset = %path.display(),
                error = %error,
                "voice creation failed, using silent fallback"
            ),
            None => warn!(error = %error, "voice creation failed, using silent fallback"),
        }
        if let Some(hook) = self.load_error_hook.as_mut() {
            hook(asset, error);
        }
    }

    fn voice_params(&self) -> VoiceParams {
        VoiceParams::new(self.config.reference_distance, self.config.rolloff_factor)
    }

    /// Create a paused voice for `asset` on `channel`.
    pub fn create_voice(
        &mut self,
        asset: impl AsRef<Path>,
        channel: ChannelId,
        kind: SourceKind,
    ) -> VoiceHandle {
        let asset = asset.as_ref();
        let built = if self.is_headless() {
            None
        } else {
            match self.open_variant(asset, kind) {
                Ok(variant) => Some(variant),
                Err(e) => {
                    self.report(Some(asset), &e);
                    None
                }
            }
        };
        let handle = self.insert(channel, built);
        debug!(%handle, asset = %asset.display(), %channel, ?kind, "voice created");
        handle
    }

    /// Create a paused voice playing an already-open source. Static voices
    /// made this way own their buffer and are not cached.
    pub fn create_voice_from_source(
        &mut self,
        pcm: Box<dyn PcmSource>,
        channel: ChannelId,
        kind: SourceKind,
    ) -> VoiceHandle {
        let built = if self.is_headless() {
            None
        } else {
            match self.source_variant(pcm, kind) {
                Ok(variant) => Some(variant),
                Err(e) => {
                    self.report(None, &e);
                    None
                }
            }
        };
        self.insert(channel, built)
    }

    /// Create a voice for `asset` and start it.
    pub fn play(
        &mut self,
        asset: impl AsRef<Path>,
        channel: ChannelId,
        kind: SourceKind,
    ) -> VoiceHandle {
        let handle = self.create_voice(asset, channel, kind);
        if let Some(mut voice) = self.voice_mut(handle) {
            voice.play();
        }
        handle
    }

    /// Decode `asset` into the static cache ahead of time. A no-op without a
    /// device.
    pub fn preload(&mut self, asset: impl AsRef<Path>) -> Result<()> {
        if self.is_headless() {
            return Ok(());
        }
        self.static_buffer(asset.as_ref()).map(|_| ())
    }

    /// Number of assets in the static cache.
    pub fn cached_assets(&self) -> usize {
        self.cache.len()
    }

    fn open_variant(&mut self, asset: &Path, kind: SourceKind) -> Result<VoiceKind> {
        match kind {
            SourceKind::Static => {
                let buffer = self.static_buffer(asset)?;
                let backend = self.device.as_deref_mut().ok_or(Error::NoDevice)?;
                StaticVoice::new(backend, buffer).map(VoiceKind::Static)
            }
            SourceKind::Stream => {
                let pcm = self.opener.open(asset)?;
                let backend = self.device.as_deref_mut().ok_or(Error::NoDevice)?;
                StreamingVoice::new(backend, pcm, &self.config.ring).map(VoiceKind::Streaming)
            }
        }
    }

    fn source_variant(&mut self, mut pcm: Box<dyn PcmSource>, kind: SourceKind) -> Result<VoiceKind> {
        let backend = self.device.as_deref_mut().ok_or(Error::NoDevice)?;
        match kind {
            SourceKind::Static => {
                let buffer = Rc::new(StaticBuffer::load(backend, &mut *pcm)?);
                let id = buffer.id;
                StaticVoice::new(backend, buffer)
                    .map(VoiceKind::Static)
                    .inspect_err(|_| warn_on_err("delete buffer", backend.delete_buffer(id)))
            }
            SourceKind::Stream => {
                StreamingVoice::new(backend, pcm, &self.config.ring).map(VoiceKind::Streaming)
            }
        }
    }

    fn static_buffer(&mut self, asset: &Path) -> Result<Rc<StaticBuffer>> {
        if let Some(buffer) = self.cache.get(asset) {
            return Ok(Rc::clone(buffer));
        }
        let mut pcm = self.opener.open(asset)?;
        let backend = self.device.as_deref_mut().ok_or(Error::NoDevice)?;
        let buffer = Rc::new(StaticBuffer::load(backend, &mut *pcm)?);
        self.cache.insert(asset.to_path_buf(), Rc::clone(&buffer));
        debug!(asset = %asset.display(), frames = buffer.frames, "static asset cached");
        Ok(buffer)
    }

    fn insert(&mut self, channel: ChannelId, variant: Option<VoiceKind>) -> VoiceHandle {
        let params = self.voice_params();
        let voice = match variant {
            Some(kind) => Voice::new(channel, params, kind),
            None => Voice::dummy(channel, params),
        };
        let channel_gain = self.channels[channel.index()].gain();
        voice.apply_all(&mut self.device, channel_gain);
        let handle = self.voices.insert(voice);
        self.channels[channel.index()].add(handle);
        handle
    }

    /// Controls for a live voice, or `None` once it has been reaped.
    pub fn voice_mut(&mut self, handle: VoiceHandle) -> Option<VoiceMut<'_>> {
        let voice = self.voices.get_mut(handle)?;
        let channel_gain = self.channels[voice.channel().index()].gain();
        Some(VoiceMut {
            voice,
            device: &mut self.device,
            channel_gain,
        })
    }

    /// State of a voice. Reaped or destroyed voices read as finished.
    pub fn voice_state(&self, handle: VoiceHandle) -> VoiceState {
        self.voices
            .get(handle)
            .map_or(VoiceState::Finished, Voice::state)
    }

    /// Whether `handle` still names a voice.
    pub fn is_alive(&self, handle: VoiceHandle) -> bool {
        self.voices.contains(handle)
    }

    /// Number of live voices.
    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Stop a voice and free it immediately.
    pub fn destroy_voice(&mut self, handle: VoiceHandle) {
        if let Some(mut voice) = self.voices.remove(handle) {
            voice.finish(&mut self.device);
            voice.release(&mut self.device);
            debug!(%handle, "voice destroyed");
        }
    }

    /// Read access to a channel.
    pub fn channel(&self, id: ChannelId) -> &Channel {
        &self.channels[id.index()]
    }

    /// Group controls for a channel.
    pub fn channel_mut(&mut self, id: ChannelId) -> ChannelMut<'_> {
        ChannelMut {
            channel: &mut self.channels[id.index()],
            voices: &mut self.voices,
            device: &mut self.device,
        }
    }

    /// Advance every channel by `dt` seconds, then tick the backend.
    pub fn update(&mut self, dt: f32) {
        for channel in &mut self.channels {
            channel.update(dt, &mut self.voices, &mut self.device);
        }
        if let Some(backend) = self.device.as_deref_mut() {
            backend.update(dt);
        }
    }

    /// Current listener settings.
    pub fn listener(&self) -> Listener {
        self.listener
    }

    /// Master gain.
    pub fn master_gain(&self) -> f32 {
        self.listener.gain
    }

    /// Set the master gain.
    pub fn set_master_gain(&mut self, gain: f32) {
        if !accept_gain("master", gain) {
            return;
        }
        self.listener.gain = gain;
        if let Some(backend) = self.device.as_deref_mut() {
            warn_on_err("set listener gain", backend.set_listener_gain(gain));
        }
    }

    /// Move the listener.
    pub fn set_listener_position(&mut self, position: Vec3) {
        self.listener.position = position;
        if let Some(backend) = self.device.as_deref_mut() {
            warn_on_err("set listener position", backend.set_listener_position(position));
        }
    }

    /// Set the listener velocity.
    pub fn set_listener_velocity(&mut self, velocity: Vec3) {
        self.listener.velocity = velocity;
        if let Some(backend) = self.device.as_deref_mut() {
            warn_on_err("set listener velocity", backend.set_listener_velocity(velocity));
        }
    }

    /// Turn the listener.
    pub fn set_listener_orientation(&mut self, at: Vec3, up: Vec3) {
        self.listener.at = at;
        self.listener.up = up;
        if let Some(backend) = self.device.as_deref_mut() {
            warn_on_err(
                "set listener orientation",
                backend.set_listener_orientation(at, up),
            );
        }
    }

    fn backend_mut(&mut self) -> Result<&mut dyn AudioBackend> {
        match self.device.as_deref_mut() {
            Some(backend) => Ok(backend),
            None => Err(Error::NoDevice),
        }
    }

    /// Allocate a filter owned by the manager.
    pub fn create_filter(&mut self, kind: FilterKind) -> Result<FilterId> {
        let filter = self.backend_mut()?.create_filter(kind)?;
        self.filters.push(filter);
        Ok(filter)
    }

    /// Update a filter's gains.
    pub fn set_filter_params(&mut self, filter: FilterId, params: FilterParams) -> Result<()> {
        Ok(self.backend_mut()?.set_filter_params(filter, params)?)
    }

    /// Allocate an effect owned by the manager.
    pub fn create_effect(&mut self, kind: EffectKind) -> Result<EffectId> {
        let effect = self.backend_mut()?.create_effect(kind)?;
        self.effects.push(effect);
        Ok(effect)
    }

    /// Set an effect parameter by backend-defined index.
    pub fn set_effect_param(&mut self, effect: EffectId, index: u32, value: f32) -> Result<()> {
        Ok(self.backend_mut()?.set_effect_param(effect, index, value)?)
    }

    /// Allocate an auxiliary effect slot owned by the manager.
    pub fn create_effect_slot(&mut self) -> Result<EffectSlotId> {
        let slot = self.backend_mut()?.create_effect_slot()?;
        self.slots.push(slot);
        Ok(slot)
    }

    /// Load an effect into a slot, or empty it.
    pub fn attach_effect(&mut self, slot: EffectSlotId, effect: Option<EffectId>) -> Result<()> {
        Ok(self.backend_mut()?.attach_effect(slot, effect)?)
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        for voice in self.voices.drain() {
            voice.release(&mut self.device);
        }
        let Some(backend) = self.device.as_deref_mut() else {
            return;
        };
        for (_, buffer) in self.cache.drain() {
            if let Ok(buffer) = Rc::try_unwrap(buffer) {
                warn_on_err("delete buffer", backend.delete_buffer(buffer.id));
            }
        }
        for slot in self.slots.drain(..) {
            warn_on_err("empty effect slot", backend.attach_effect(slot, None));
            warn_on_err("delete effect slot", backend.delete_effect_slot(slot));
        }
        for effect in self.effects.drain(..) {
            warn_on_err("delete effect", backend.delete_effect(effect));
        }
        for filter in self.filters.drain(..) {
            warn_on_err("delete filter", backend.delete_filter(filter));
        }
        debug!("voice manager shut down");
    }
}

/// Controls for one live voice, borrowed from the [`Manager`].
///
/// Setters on a dummy voice are accepted and ignored. Setters never revive a
/// finished voice.
pub struct VoiceMut<'a> {
    voice: &'a mut Voice,
    device: &'a mut Device,
    channel_gain: f32,
}

impl VoiceMut<'_> {
    /// Playback state.
    pub fn state(&self) -> VoiceState {
        self.voice.state()
    }

    /// How the voice is backed; `None` for a dummy.
    pub fn kind(&self) -> Option<SourceKind> {
        self.voice.kind()
    }

    /// Whether this is a silent fallback voice.
    pub fn is_dummy(&self) -> bool {
        self.voice.is_dummy()
    }

    /// Channel the voice belongs to.
    pub fn channel(&self) -> ChannelId {
        self.voice.channel()
    }

    /// Backend source, if any.
    pub fn source_id(&self) -> Option<SourceId> {
        self.voice.source_id()
    }

    /// PCM format of the asset, if any.
    pub fn format(&self) -> Option<SampleFormat> {
        self.voice.format()
    }

    /// Start or resume.
    pub fn play(&mut self) {
        self.voice.play(self.device);
    }

    /// Hold the current position.
    pub fn pause(&mut self) {
        self.voice.pause(self.device);
    }

    /// Stop for good. The voice is reaped on the next update.
    pub fn finish(&mut self) {
        self.voice.finish(self.device);
    }

    fn set(&mut self, param: SourceParam) {
        self.voice.set_param(self.device, param, self.channel_gain);
    }

    /// Voice gain, before channel and fade gains.
    pub fn gain(&self) -> f32 {
        self.voice.params().gain
    }

    /// Set the voice gain. Negative or non-finite gains are ignored.
    pub fn set_gain(&mut self, gain: f32) {
        self.set(SourceParam::Gain(gain));
    }

    /// Gain actually sent to the backend.
    pub fn effective_gain(&self) -> f32 {
        self.voice.effective_gain(self.channel_gain)
    }

    /// Playback rate multiplier.
    pub fn pitch(&self) -> f32 {
        self.voice.params().pitch
    }

    /// Set the playback rate multiplier.
    pub fn set_pitch(&mut self, pitch: f32) {
        self.set(SourceParam::Pitch(pitch));
    }

    /// Position in listener space.
    pub fn position(&self) -> Vec3 {
        self.voice.params().position
    }

    /// Move the voice.
    pub fn set_position(&mut self, position: Vec3) {
        self.set(SourceParam::Position(position));
    }

    /// Velocity.
    pub fn velocity(&self) -> Vec3 {
        self.voice.params().velocity
    }

    /// Set the velocity.
    pub fn set_velocity(&mut self, velocity: Vec3) {
        self.set(SourceParam::Velocity(velocity));
    }

    /// Make the position listener-relative.
    pub fn set_relative(&mut self, relative: bool) {
        self.set(SourceParam::Relative(relative));
    }

    /// Distance at which attenuation starts.
    pub fn set_reference_distance(&mut self, distance: f32) {
        self.set(SourceParam::ReferenceDistance(distance));
    }

    /// Distance attenuation slope.
    pub fn set_rolloff_factor(&mut self, factor: f32) {
        self.set(SourceParam::RolloffFactor(factor));
    }

    /// Route the dry path through a filter, or clear it.
    pub fn set_direct_filter(&mut self, filter: Option<FilterId>) {
        self.voice.set_direct_filter(self.device, filter);
    }

    /// Send to an effect slot through an optional filter, or clear the send.
    pub fn set_effect_slot(&mut self, slot: Option<EffectSlotId>, filter: Option<FilterId>) {
        self.voice.set_effect_send(self.device, slot, filter);
    }

    /// Start a fade, replacing any running one. A fade-out finishes the voice
    /// when it completes.
    pub fn set_fading(&mut self, direction: FadeDirection, duration: f32) {
        self.voice
            .set_fading(self.device, direction, duration, self.channel_gain);
    }

    /// Running fade, if any.
    pub fn fade(&self) -> Option<Fade> {
        self.voice.fade().copied()
    }

    /// Loop `[begin, end)` in samples. Streaming voices only.
    pub fn set_loop(&mut self, begin: u64, end: u64) -> Result<()> {
        self.voice.set_loop(begin, end)
    }

    /// Loop the whole asset, or stop looping.
    pub fn set_looping(&mut self, looping: bool) -> Result<()> {
        self.voice.set_looping(self.device, looping)
    }

    /// Active loop range.
    pub fn loop_range(&self) -> Option<LoopRange> {
        self.voice.loop_range()
    }

    /// Jump to a sample.
    pub fn seek_to_sample(&mut self, sample: u64) -> Result<()> {
        self.voice.seek_to_sample(self.device, sample)
    }

    /// Jump to a time in seconds.
    pub fn seek_to(&mut self, secs: f64) -> Result<()> {
        if secs.is_nan() || secs < 0.0 {
            return Err(Error::Unsupported("seek to a negative time"));
        }
        let sample = self.sec_to_sample(secs);
        self.seek_to_sample(sample)
    }

    /// Samples played since the start, counting loop repeats.
    pub fn sample_pos(&self) -> u64 {
        self.voice.sample_pos(self.device)
    }

    /// [`sample_pos`](Self::sample_pos) in seconds.
    pub fn pos(&self) -> f64 {
        self.sample_to_sec(self.sample_pos())
    }

    /// Position within the asset, wrapped by the loop range.
    pub fn cursor_pos(&self) -> u64 {
        self.voice.cursor_pos(self.device)
    }

    /// Asset length in samples; 0 for a dummy.
    pub fn sample_duration(&self) -> u64 {
        self.voice.sample_duration()
    }

    /// Asset length in seconds.
    pub fn duration(&self) -> f64 {
        self.sample_to_sec(self.sample_duration())
    }

    /// Convert seconds to samples at the asset rate.
    pub fn sec_to_sample(&self, secs: f64) -> u64 {
        self.voice.format().map_or(0, |f| f.secs_to_frames(secs))
    }

    /// Convert samples to seconds at the asset rate.
    pub fn sample_to_sec(&self, sample: u64) -> f64 {
        self.voice.format().map_or(0.0, |f| f.frames_to_secs(sample))
    }
}

/// Group controls for one channel, borrowed from the [`Manager`].
pub struct ChannelMut<'a> {
    channel: &'a mut Channel,
    voices: &'a mut Arena<Voice>,
    device: &'a mut Device,
}

impl ChannelMut<'_> {
    /// Which channel this is.
    pub fn id(&self) -> ChannelId {
        self.channel.id()
    }

    /// Channel gain.
    pub fn gain(&self) -> f32 {
        self.channel.gain()
    }

    /// Set the channel gain. Not clamped above; negative or non-finite gains
    /// are ignored. Every member is re-pushed.
    pub fn set_gain(&mut self, gain: f32) {
        self.channel.set_gain(gain, self.voices, self.device);
    }

    /// Pause every playing member.
    pub fn pause(&mut self) {
        self.channel.pause(self.voices, self.device);
    }

    /// Resume the members the last [`pause`](Self::pause) stopped.
    pub fn resume(&mut self) {
        self.channel.resume(self.voices, self.device);
    }

    /// Finish every member.
    pub fn stop(&mut self) {
        self.channel.stop(self.voices, self.device);
    }

    /// Alias for [`stop`](Self::stop).
    pub fn finish_all(&mut self) {
        self.stop();
    }

    /// Number of tracked voices.
    pub fn len(&self) -> usize {
        self.channel.len()
    }

    /// Whether the channel tracks no voices.
    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }
}
