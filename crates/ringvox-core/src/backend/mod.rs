//! Hardware backend abstraction.
//!
//! The engine drives output through the [`AudioBackend`] trait, modeled on the
//! OpenAL object set: buffer objects hold uploaded PCM, source objects play
//! either one attached buffer or a FIFO queue of buffers, and effect objects
//! (filters, effects, auxiliary slots) are opaque handles routed per source.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │   Manager / Channel / Voice      │
//! └──────────────┬───────────────────┘
//!                │ &mut dyn AudioBackend
//!                ▼
//! ┌──────────────────────────────────┐
//! │        AudioBackend trait        │
//! │ buffers · sources · queue · fx   │
//! └──────────────┬───────────────────┘
//!                │ implemented by
//!        ┌───────┴────────┐
//!        ▼                ▼
//! ┌──────────────┐  ┌─────────────┐
//! │VirtualBackend│  │ device      │
//! │ (simulated)  │  │ bindings    │
//! └──────────────┘  └─────────────┘
//! ```
//!
//! ## Queue semantics
//!
//! A streaming source consumes queued buffers in order. A buffer it has fully
//! played becomes *processed* and stays in the queue until the owner dequeues
//! it. When the last queued buffer is consumed the source stops by itself; this
//! is how an underrun shows up. Stopping a source explicitly marks every queued
//! buffer processed and rewinds its offset to 0. Playing a stopped source
//! starts again from the head of the queue.
//!
//! The trait is object-safe; the manager holds a `Box<dyn AudioBackend>`.

mod virtual_device;

pub use virtual_device::VirtualBackend;

use crate::{BackendError, SampleFormat};

/// Result of a backend call.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// A 3-component vector in listener space.
pub type Vec3 = [f32; 3];

macro_rules! backend_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

backend_handle!(
    /// Opaque buffer object handle.
    BufferId
);
backend_handle!(
    /// Opaque source (hardware voice) handle.
    SourceId
);
backend_handle!(
    /// Opaque filter object handle.
    FilterId
);
backend_handle!(
    /// Opaque effect object handle.
    EffectId
);
backend_handle!(
    /// Opaque auxiliary effect slot handle.
    EffectSlotId
);

/// Transport command for a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Start, resume, or restart playback.
    Play,
    /// Hold the current position.
    Pause,
    /// Halt and mark every queued buffer processed.
    Stop,
}

/// Transport state reported by a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Never played.
    Initial,
    /// Consuming audio.
    Playing,
    /// Held by [`Transport::Pause`].
    Paused,
    /// Stopped explicitly or by running out of queued audio.
    Stopped,
}

/// Per-source scalar and vector parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceParam {
    /// Linear gain.
    Gain(f32),
    /// Playback rate multiplier.
    Pitch(f32),
    /// Position in listener space.
    Position(Vec3),
    /// Velocity for doppler.
    Velocity(Vec3),
    /// Distance at which attenuation starts.
    ReferenceDistance(f32),
    /// Distance attenuation slope.
    RolloffFactor(f32),
    /// Whether position is relative to the listener.
    Relative(bool),
}

/// Listener placement and master gain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Listener {
    /// Master gain.
    pub gain: f32,
    /// Position.
    pub position: Vec3,
    /// Velocity.
    pub velocity: Vec3,
    /// Facing direction.
    pub at: Vec3,
    /// Up direction.
    pub up: Vec3,
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            gain: 1.0,
            position: [0.0; 3],
            velocity: [0.0; 3],
            at: [0.0, 0.0, -1.0],
            up: [0.0, 1.0, 0.0],
        }
    }
}

/// Filter kinds a backend may offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    /// Attenuates high frequencies.
    LowPass,
    /// Attenuates low frequencies.
    HighPass,
    /// Attenuates both ends.
    BandPass,
}

/// Filter gains. Which fields apply depends on the [`FilterKind`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParams {
    /// Overall gain.
    pub gain: f32,
    /// Low-frequency gain (high-pass, band-pass).
    pub gain_lf: f32,
    /// High-frequency gain (low-pass, band-pass).
    pub gain_hf: f32,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            gain: 1.0,
            gain_lf: 1.0,
            gain_hf: 1.0,
        }
    }
}

/// Effect kinds a backend may offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum EffectKind {
    Reverb,
    Chorus,
    Distortion,
    Echo,
    Flanger,
    FrequencyShifter,
    VocalMorpher,
    PitchShifter,
    RingModulator,
    Autowah,
    Compressor,
    Equalizer,
}

impl EffectKind {
    /// Every effect kind.
    pub const ALL: [EffectKind; 12] = [
        EffectKind::Reverb,
        EffectKind::Chorus,
        EffectKind::Distortion,
        EffectKind::Echo,
        EffectKind::Flanger,
        EffectKind::FrequencyShifter,
        EffectKind::VocalMorpher,
        EffectKind::PitchShifter,
        EffectKind::RingModulator,
        EffectKind::Autowah,
        EffectKind::Compressor,
        EffectKind::Equalizer,
    ];

    /// Lowercase name used on the command line.
    pub fn name(self) -> &'static str {
        match self {
            EffectKind::Reverb => "reverb",
            EffectKind::Chorus => "chorus",
            EffectKind::Distortion => "distortion",
            EffectKind::Echo => "echo",
            EffectKind::Flanger => "flanger",
            EffectKind::FrequencyShifter => "frequency-shifter",
            EffectKind::VocalMorpher => "vocal-morpher",
            EffectKind::PitchShifter => "pitch-shifter",
            EffectKind::RingModulator => "ring-modulator",
            EffectKind::Autowah => "autowah",
            EffectKind::Compressor => "compressor",
            EffectKind::Equalizer => "equalizer",
        }
    }

    /// Look up a kind by its [`name`](Self::name).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

/// Output device capability driven by the engine.
///
/// All calls happen on the thread that owns the manager. Queries on a handle
/// the backend does not know return neutral values (0, `Initial`) rather than
/// errors.
pub trait AudioBackend {
    /// Human-readable backend name.
    fn name(&self) -> &str;

    /// Allocate an empty buffer object.
    fn create_buffer(&mut self) -> BackendResult<BufferId>;

    /// Free a buffer. Fails with [`BackendError::InUse`] while it is queued on
    /// or attached to a source.
    fn delete_buffer(&mut self, buffer: BufferId) -> BackendResult<()>;

    /// Replace a buffer's contents with interleaved PCM.
    fn upload(&mut self, buffer: BufferId, pcm: &[u8], format: SampleFormat)
    -> BackendResult<()>;

    /// Allocate a source object.
    fn create_source(&mut self) -> BackendResult<SourceId>;

    /// Stop and free a source, detaching whatever it held.
    fn delete_source(&mut self, source: SourceId) -> BackendResult<()>;

    /// Bind a single buffer for static playback, or unbind with `None`.
    fn attach_buffer(&mut self, source: SourceId, buffer: Option<BufferId>)
    -> BackendResult<()>;

    /// Append a buffer to the source's queue.
    fn enqueue(&mut self, source: SourceId, buffer: BufferId) -> BackendResult<()>;

    /// Remove every processed buffer from the head of the queue, oldest first.
    fn dequeue_processed(&mut self, source: SourceId) -> BackendResult<Vec<BufferId>>;

    /// Buffers currently in the queue, processed ones included.
    fn queued_count(&self, source: SourceId) -> usize;

    /// Queued buffers the source has finished playing.
    fn processed_count(&self, source: SourceId) -> usize;

    /// Issue a transport command.
    fn set_transport(&mut self, source: SourceId, transport: Transport) -> BackendResult<()>;

    /// Current transport state.
    fn transport_state(&self, source: SourceId) -> TransportState;

    /// Playback offset in frames from the start of the first buffer still in
    /// the queue (or of the attached buffer). 0 after an explicit stop.
    fn sample_offset(&self, source: SourceId) -> u64;

    /// Move the playback offset of a source with an attached buffer.
    fn set_sample_offset(&mut self, source: SourceId, offset: u64) -> BackendResult<()>;

    /// Native looping of an attached buffer.
    fn set_looping(&mut self, source: SourceId, looping: bool) -> BackendResult<()>;

    /// Set one scalar or vector parameter.
    fn set_param(&mut self, source: SourceId, param: SourceParam) -> BackendResult<()>;

    /// Route the dry path through a filter, or clear it.
    fn set_direct_filter(&mut self, source: SourceId, filter: Option<FilterId>)
    -> BackendResult<()>;

    /// Route a send to an effect slot through an optional filter, or clear it.
    fn set_effect_send(
        &mut self,
        source: SourceId,
        slot: Option<EffectSlotId>,
        filter: Option<FilterId>,
    ) -> BackendResult<()>;

    /// Listener (master) gain.
    fn set_listener_gain(&mut self, gain: f32) -> BackendResult<()>;

    /// Listener position.
    fn set_listener_position(&mut self, position: Vec3) -> BackendResult<()>;

    /// Listener velocity.
    fn set_listener_velocity(&mut self, velocity: Vec3) -> BackendResult<()>;

    /// Listener orientation as "at" and "up" vectors.
    fn set_listener_orientation(&mut self, at: Vec3, up: Vec3) -> BackendResult<()>;

    /// Allocate a filter object.
    fn create_filter(&mut self, kind: FilterKind) -> BackendResult<FilterId>;

    /// Update a filter's gains.
    fn set_filter_params(&mut self, filter: FilterId, params: FilterParams) -> BackendResult<()>;

    /// Free a filter object.
    fn delete_filter(&mut self, filter: FilterId) -> BackendResult<()>;

    /// Allocate an effect object.
    fn create_effect(&mut self, kind: EffectKind) -> BackendResult<EffectId>;

    /// Set an effect parameter by backend-defined index.
    fn set_effect_param(&mut self, effect: EffectId, index: u32, value: f32)
    -> BackendResult<()>;

    /// Free an effect object.
    fn delete_effect(&mut self, effect: EffectId) -> BackendResult<()>;

    /// Allocate an auxiliary effect slot.
    fn create_effect_slot(&mut self) -> BackendResult<EffectSlotId>;

    /// Load an effect into a slot, or empty it.
    fn attach_effect(&mut self, slot: EffectSlotId, effect: Option<EffectId>)
    -> BackendResult<()>;

    /// Free an effect slot.
    fn delete_effect_slot(&mut self, slot: EffectSlotId) -> BackendResult<()>;

    /// Per-tick hook, called by the manager after every channel has updated.
    fn update(&mut self, _dt: f32) {}
}
