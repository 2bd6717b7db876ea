//! PCM sources for the ringvox voice engine.
//!
//! This crate provides:
//!
//! - **WAV decoding**: [`WavSource`] over any seekable reader, via `hound`
//! - **Compressed decoding**: [`CompressedSource`] for Ogg Vorbis, FLAC and MP3, via `symphonia`
//! - **Procedural audio**: [`ToneSource`] for sine tones without an asset file
//! - **Format sniffing**: [`open_file`] / [`open_reader`] pick the decoder from the file magic
//! - **Asset loading**: [`FileOpener`] plugs file decoding into the [`Manager`](ringvox_core::Manager)
//! - **PCM export**: [`write_wav`] and [`write_raw`] drain a source to disk
//!
//! Every source produces interleaved little-endian integer PCM (unsigned 8-bit
//! or signed 16-bit), the layouts the engine's backends accept.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ringvox_core::{ChannelId, EngineConfig, Manager, SourceKind, VirtualBackend};
//! use ringvox_io::FileOpener;
//!
//! let opener = FileOpener::with_root("assets/sounds");
//! let mut manager = Manager::new(Box::new(VirtualBackend::new()), opener, EngineConfig::default());
//! manager.play("door.wav", ChannelId::Sound, SourceKind::Static);
//! ```

mod decoder;
mod error;
mod open;
mod tone;
mod wav;
mod writer;

pub use decoder::CompressedSource;
pub use open::{FileOpener, open_file, open_reader};
pub use symphonia::core::io::MediaSource;
pub use tone::ToneSource;
pub use wav::WavSource;
pub use writer::{write_raw, write_wav};
