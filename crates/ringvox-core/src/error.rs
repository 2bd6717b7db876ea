//! Error types for the voice engine.

use std::path::PathBuf;
use thiserror::Error;

/// Failures reported by an [`AudioBackend`](crate::AudioBackend).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The handle does not name a live backend object.
    #[error("invalid {kind} handle {id}")]
    InvalidHandle {
        /// Object kind ("buffer", "source", "filter", ...).
        kind: &'static str,
        /// Raw handle value.
        id: u32,
    },

    /// The object is still referenced (a queued or attached buffer).
    #[error("{0} is still in use")]
    InUse(&'static str),

    /// The device cannot allocate another object of this kind.
    #[error("out of {0} objects")]
    OutOfResources(&'static str),

    /// A parameter value was refused.
    #[error("parameter rejected: {0}")]
    Rejected(String),

    /// The output device went away.
    #[error("device lost")]
    DeviceLost,
}

/// Errors produced by the engine and its sources.
#[derive(Debug, Error)]
pub enum Error {
    /// Standard I/O error while opening or reading an asset.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The container or codec data is malformed.
    #[error("decode error: {0}")]
    Decode(String),

    /// The asset decodes to PCM the backend cannot take.
    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// No decoder recognizes the asset.
    #[error("unknown audio format")]
    UnknownFormat,

    /// The backend rejected a request.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Loop range outside `0 <= begin < end <= total`.
    #[error("invalid loop range {begin}..{end} (asset has {total} samples)")]
    InvalidLoop {
        /// Requested first sample of the loop.
        begin: u64,
        /// Requested end sample (exclusive).
        end: u64,
        /// Total samples in the asset.
        total: u64,
    },

    /// Seek target past the end of the asset.
    #[error("seek to sample {target} beyond end of asset ({total} samples)")]
    SeekOutOfRange {
        /// Requested sample.
        target: u64,
        /// Total samples in the asset.
        total: u64,
    },

    /// The operation is not available for this kind of voice or source.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// The manager has no backend.
    #[error("no audio device")]
    NoDevice,
}

impl Error {
    /// Create a decode error from any displayable cause.
    pub fn decode(cause: impl std::fmt::Display) -> Self {
        Error::Decode(cause.to_string())
    }
}

/// Convenience result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading or saving engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    ReadFile {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a file
    #[error("failed to write file '{path}': {source}")]
    WriteFile {
        /// Path of the file that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to serialize TOML
    #[error("failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Failed to create directory
    #[error("failed to create directory '{path}': {source}")]
    CreateDir {
        /// Path of the directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A setting is out of range
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue {
        /// Dotted key of the offending setting.
        key: &'static str,
        /// Why the value was refused.
        reason: String,
    },
}

impl ConfigError {
    /// Create a read file error.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// Create a write file error.
    pub fn write_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::WriteFile {
            path: path.into(),
            source,
        }
    }

    /// Create a create directory error.
    pub fn create_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::CreateDir {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid value error.
    pub fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    fn mock_io_err() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::NotFound, "mock")
    }

    #[test]
    fn io_error_converts_and_keeps_message() {
        let err: Error = mock_io_err().into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("mock"));
    }

    #[test]
    fn backend_error_converts() {
        let err: Error = BackendError::DeviceLost.into();
        assert!(matches!(err, Error::Backend(BackendError::DeviceLost)));
        assert_eq!(err.to_string(), "backend error: device lost");
    }

    #[test]
    fn invalid_loop_display_names_range() {
        let err = Error::InvalidLoop {
            begin: 10,
            end: 5,
            total: 100,
        };
        assert_eq!(
            err.to_string(),
            "invalid loop range 10..5 (asset has 100 samples)"
        );
    }

    #[test]
    fn decode_factory_formats_cause() {
        let err = Error::decode("bad header");
        assert!(matches!(err, Error::Decode(ref m) if m == "bad header"));
    }

    #[test]
    fn read_file_has_io_source() {
        let err = ConfigError::read_file("/some/path", mock_io_err());
        assert!(err.source().is_some());
        assert!(err.to_string().contains("/some/path"));
    }

    #[test]
    fn invalid_value_display() {
        let err = ConfigError::invalid("ring.buffers", "must be at least 2");
        assert_eq!(
            err.to_string(),
            "invalid value for 'ring.buffers': must be at least 2"
        );
    }
}
