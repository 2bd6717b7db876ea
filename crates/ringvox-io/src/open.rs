//! Decoder selection by file magic.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use ringvox_core::{AssetOpener, Error, PcmSource, Result};
use symphonia::core::io::MediaSource;
use symphonia::core::probe::Hint;
use tracing::debug;

use crate::{CompressedSource, WavSource};

/// Open a decoder for `reader`, picked by its leading bytes.
///
/// `RIFF` streams go to [`WavSource`]; everything else is detected by
/// [`CompressedSource`], with `extension` as a hint. The reader is rewound
/// before decoding starts.
pub fn open_reader<R: MediaSource + 'static>(
    mut reader: R,
    extension: Option<&str>,
) -> Result<Box<dyn PcmSource>> {
    let mut magic = [0u8; 4];
    match reader.read_exact(&mut magic) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Err(Error::UnknownFormat),
        Err(e) => return Err(e.into()),
    }
    reader.seek(SeekFrom::Start(0))?;

    if &magic == b"RIFF" {
        debug!("RIFF magic, decoding as WAV");
        return Ok(Box::new(WavSource::new(BufReader::new(reader))?));
    }
    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }
    Ok(Box::new(CompressedSource::new(Box::new(reader), &hint)?))
}

/// Open a decoder for the file at `path`.
pub fn open_file<P: AsRef<Path>>(path: P) -> Result<Box<dyn PcmSource>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    open_reader(file, path.extension().and_then(|e| e.to_str()))
}

/// Loads assets from the filesystem, optionally below a root directory.
#[derive(Debug, Clone, Default)]
pub struct FileOpener {
    root: Option<PathBuf>,
}

impl FileOpener {
    /// Resolve asset paths as given.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative asset paths below `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    /// Path an asset name resolves to.
    pub fn resolve(&self, asset: &Path) -> PathBuf {
        match &self.root {
            Some(root) if asset.is_relative() => root.join(asset),
            _ => asset.to_path_buf(),
        }
    }
}

impl AssetOpener for FileOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn PcmSource>> {
        open_file(self.resolve(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn short_input_is_unknown_format() {
        let err = open_reader(Cursor::new(vec![b'R', b'I']), None).err().unwrap();
        assert!(matches!(err, Error::UnknownFormat));
    }

    #[test]
    fn riff_magic_without_wave_body_fails_in_wav_decoder() {
        let err = open_reader(Cursor::new(b"RIFF\0\0\0\0JUNK".to_vec()), None).err().unwrap();
        assert!(matches!(err, Error::Decode(_) | Error::Io(_)));
    }

    #[test]
    fn root_applies_to_relative_paths_only() {
        let opener = FileOpener::with_root("/data/sfx");
        assert_eq!(
            opener.resolve(Path::new("door.wav")),
            PathBuf::from("/data/sfx/door.wav")
        );
        assert_eq!(
            opener.resolve(Path::new("/tmp/x.ogg")),
            PathBuf::from("/tmp/x.ogg")
        );
        assert_eq!(
            FileOpener::new().resolve(Path::new("a.wav")),
            PathBuf::from("a.wav")
        );
    }
}
