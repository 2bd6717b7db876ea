//! Mapping of decoder library errors onto the engine error type.

use ringvox_core::Error;

pub(crate) fn from_hound(err: hound::Error) -> Error {
    match err {
        hound::Error::IoError(e) => Error::Io(e),
        hound::Error::Unsupported => Error::UnsupportedFormat("WAV encoding".into()),
        other => Error::decode(other),
    }
}

pub(crate) fn from_symphonia(err: symphonia::core::errors::Error) -> Error {
    use symphonia::core::errors::Error as Sym;
    match err {
        Sym::IoError(e) => Error::Io(e),
        Sym::Unsupported(what) => Error::UnsupportedFormat(what.into()),
        other => Error::decode(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_keep_their_kind() {
        let err = from_hound(hound::Error::IoError(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "short",
        )));
        assert!(matches!(err, Error::Io(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn format_errors_become_decode_errors() {
        let err = from_hound(hound::Error::FormatError("no RIFF tag found"));
        assert!(matches!(err, Error::Decode(_)));
        let err = from_symphonia(symphonia::core::errors::Error::DecodeError("bad frame"));
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn unsupported_codecs_are_format_errors() {
        let err = from_symphonia(symphonia::core::errors::Error::Unsupported("codec"));
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }
}
