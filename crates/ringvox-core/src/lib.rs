//! Ringvox Core - voice engine for streamed and static game audio
//!
//! This crate manages the lifetime of playing sounds ("voices") on top of an
//! OpenAL-style output device. Long assets stream through a small ring of
//! backend buffers refilled on every tick; short assets decode once into a
//! shared buffer. The caller owns the frame loop and drives everything through
//! [`Manager::update`].
//!
//! # Core Abstractions
//!
//! ## Engine
//!
//! - [`Manager`] - Voice arena, channels, static buffer cache, effect objects
//! - [`VoiceHandle`] - Generation-checked reference to a voice
//! - [`VoiceMut`] - Per-voice controls (transport, 3D, fades, loops, seeking)
//! - [`ChannelMut`] - Group controls for one [`ChannelId`]
//!
//! ## Backends
//!
//! - [`AudioBackend`] - Object-safe device trait (buffers, sources, queues, effects)
//! - [`VirtualBackend`] - Deterministic simulated device for tests and tooling
//!
//! ## Sources
//!
//! - [`PcmSource`] - Seekable interleaved PCM producer
//! - [`MemorySource`] - PCM held in memory
//! - [`AssetOpener`] - Maps an asset path to a [`PcmSource`]
//!
//! ## Envelopes
//!
//! - [`Fade`] - Linear fade-in / fade-out gain envelope
//!
//! ## Configuration
//!
//! - [`EngineConfig`] - Ring geometry, gains and distance model, from TOML
//!
//! # Example
//!
//! ```rust,ignore
//! use ringvox_core::{ChannelId, EngineConfig, Manager, SourceKind, VirtualBackend};
//!
//! let mut manager = Manager::new(
//!     Box::new(VirtualBackend::new()),
//!     ringvox_io::FileOpener::new(),
//!     EngineConfig::default(),
//! );
//! let music = manager.play("theme.ogg", ChannelId::Music, SourceKind::Stream);
//! if let Some(mut voice) = manager.voice_mut(music) {
//!     voice.set_loop(0, 44_100 * 30)?;
//! }
//!
//! loop {
//!     manager.update(1.0 / 60.0);
//! }
//! ```
//!
//! # Design Principles
//!
//! - **Single-threaded**: every call happens on the thread that owns the manager
//! - **Never fatal**: a voice that cannot be created plays as a silent dummy
//! - **Handles, not pointers**: destroyed voices make handles stale, not dangling

mod arena;
pub mod backend;
mod channel;
pub mod config;
mod error;
mod fade;
mod format;
mod manager;
mod source;
mod voice;

pub use arena::VoiceHandle;
pub use backend::{
    AudioBackend, BackendResult, BufferId, EffectId, EffectKind, EffectSlotId, FilterId,
    FilterKind, FilterParams, Listener, SourceId, SourceParam, Transport, TransportState, Vec3,
    VirtualBackend,
};
pub use channel::{Channel, ChannelId};
pub use config::{ChannelGains, EngineConfig, RingConfig};
pub use error::{BackendError, ConfigError, Error, Result};
pub use fade::{Fade, FadeDirection, FadeStep};
pub use format::SampleFormat;
pub use manager::{ChannelMut, LoadErrorHook, Manager, VoiceMut};
pub use source::{AssetOpener, MemorySource, PcmSource, read_to_end};
pub use voice::{LoopRange, SourceKind, VoiceState};
