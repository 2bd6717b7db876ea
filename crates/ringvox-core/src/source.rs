//! The decode contract voices pull PCM through.
//!
//! Decoders live outside this crate (see `ringvox-io`); the engine only needs
//! a cursor over interleaved PCM that can report its format, read forward,
//! and jump to an arbitrary sample. [`MemorySource`] is the one in-crate
//! implementation, useful for generated audio and tests.

use std::path::Path;
use std::sync::Arc;

use crate::{Error, Result, SampleFormat};

/// A seekable cursor over decoded PCM.
///
/// Invariant: `tell_bytes() <= total_bytes()`, and `read` returns 0 only at
/// end of stream. Reads resume from the new position after any seek, and
/// seeking backwards any number of times must not drift.
pub trait PcmSource {
    /// Layout of the PCM this source produces.
    fn format(&self) -> SampleFormat;

    /// Total decoded length in bytes.
    fn total_bytes(&self) -> u64;

    /// Current byte position.
    fn tell_bytes(&self) -> u64;

    /// Fill `buf` with up to `buf.len()` bytes of PCM, returning how many were
    /// written. Implementations only return whole frames.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Reposition to frame `sample`. `sample == sample_duration()` is valid and
    /// leaves the source at end of stream.
    fn seek_to_sample(&mut self, sample: u64) -> Result<()>;

    /// Total length in frames.
    fn sample_duration(&self) -> u64 {
        self.format().bytes_to_frames(self.total_bytes())
    }

    /// Total length in seconds.
    fn duration(&self) -> f64 {
        self.format().frames_to_secs(self.sample_duration())
    }

    /// Whether the cursor sits at the end of the stream.
    fn is_eof(&self) -> bool {
        self.tell_bytes() >= self.total_bytes()
    }
}

impl<S: PcmSource + ?Sized> PcmSource for Box<S> {
    fn format(&self) -> SampleFormat {
        (**self).format()
    }

    fn total_bytes(&self) -> u64 {
        (**self).total_bytes()
    }

    fn tell_bytes(&self) -> u64 {
        (**self).tell_bytes()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn seek_to_sample(&mut self, sample: u64) -> Result<()> {
        (**self).seek_to_sample(sample)
    }
}

/// Decode the remainder of `source` into memory.
pub fn read_to_end(source: &mut dyn PcmSource) -> Result<Vec<u8>> {
    let remaining = source.total_bytes().saturating_sub(source.tell_bytes());
    let mut pcm = Vec::with_capacity(usize::try_from(remaining).unwrap_or(0));
    let chunk = source.format().align_bytes(64 * 1024).max(1);
    let mut scratch = vec![0u8; chunk];
    loop {
        let n = source.read(&mut scratch)?;
        if n == 0 {
            break;
        }
        pcm.extend_from_slice(&scratch[..n]);
    }
    Ok(pcm)
}

/// Opens named assets as [`PcmSource`]s for the [`Manager`](crate::Manager).
///
/// Implemented for any `Fn(&Path) -> Result<Box<dyn PcmSource>>`, so tests and
/// embedders can hand the manager a closure.
pub trait AssetOpener {
    /// Open `path` for decoding.
    fn open(&self, path: &Path) -> Result<Box<dyn PcmSource>>;
}

impl<F> AssetOpener for F
where
    F: Fn(&Path) -> Result<Box<dyn PcmSource>>,
{
    fn open(&self, path: &Path) -> Result<Box<dyn PcmSource>> {
        self(path)
    }
}

/// PCM held in memory.
///
/// Clones share the underlying bytes but keep independent cursors.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Arc<[u8]>,
    format: SampleFormat,
    pos: usize,
}

impl MemorySource {
    /// Wrap `data` (truncated to whole frames) as a source of `format`.
    pub fn new(data: impl Into<Arc<[u8]>>, format: SampleFormat) -> Self {
        let data: Arc<[u8]> = data.into();
        let len = format.align_bytes(data.len());
        let data = if len == data.len() {
            data
        } else {
            Arc::from(&data[..len])
        };
        Self {
            data,
            format,
            pos: 0,
        }
    }

    /// 16-bit source from signed samples.
    pub fn from_i16(samples: &[i16], rate: u32, channels: u16) -> Self {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::new(bytes, SampleFormat::new(rate, channels, 16))
    }

    /// The full PCM buffer.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl PcmSource for MemorySource {
    fn format(&self) -> SampleFormat {
        self.format
    }

    fn total_bytes(&self) -> u64 {
        self.data.len() as u64
    }

    fn tell_bytes(&self) -> u64 {
        self.pos as u64
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let remaining = &self.data[self.pos..];
        let n = self.format.align_bytes(buf.len().min(remaining.len()));
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }

    fn seek_to_sample(&mut self, sample: u64) -> Result<()> {
        let total = self.sample_duration();
        if sample > total {
            return Err(Error::SeekOutOfRange {
                target: sample,
                total,
            });
        }
        self.pos = self.format.frames_to_bytes(sample) as usize;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: i16) -> MemorySource {
        let samples: Vec<i16> = (0..frames).collect();
        MemorySource::from_i16(&samples, 8000, 1)
    }

    #[test]
    fn test_read_and_tell() {
        let mut src = ramp(10);
        let mut buf = [0u8; 6];
        assert_eq!(src.read(&mut buf).unwrap(), 6);
        assert_eq!(src.tell_bytes(), 6);
        assert_eq!(i16::from_le_bytes([buf[4], buf[5]]), 2);
    }

    #[test]
    fn test_read_only_returns_whole_frames() {
        let mut src = MemorySource::from_i16(&[1, 2, 3, 4], 8000, 2);
        let mut buf = [0u8; 7];
        assert_eq!(src.read(&mut buf).unwrap(), 4);
    }

    #[test]
    fn test_eof_returns_zero() {
        let mut src = ramp(2);
        let mut buf = [0u8; 16];
        assert_eq!(src.read(&mut buf).unwrap(), 4);
        assert!(src.is_eof());
        assert_eq!(src.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_seek_resumes_reads() {
        let mut src = ramp(100);
        let mut buf = [0u8; 2];
        src.read(&mut [0u8; 200]).unwrap();
        src.seek_to_sample(42).unwrap();
        src.read(&mut buf).unwrap();
        assert_eq!(i16::from_le_bytes(buf), 42);
        for _ in 0..50 {
            src.seek_to_sample(7).unwrap();
        }
        src.read(&mut buf).unwrap();
        assert_eq!(i16::from_le_bytes(buf), 7);
    }

    #[test]
    fn test_seek_to_end_and_beyond() {
        let mut src = ramp(10);
        assert!(src.seek_to_sample(10).is_ok());
        assert!(src.is_eof());
        assert!(matches!(
            src.seek_to_sample(11),
            Err(Error::SeekOutOfRange {
                target: 11,
                total: 10
            })
        ));
    }

    #[test]
    fn test_partial_frame_is_truncated() {
        let src = MemorySource::new(vec![0u8; 5], SampleFormat::mono16(8000));
        assert_eq!(src.total_bytes(), 4);
        assert_eq!(src.sample_duration(), 2);
    }

    #[test]
    fn test_read_to_end_from_middle() {
        let mut src = ramp(1000);
        src.seek_to_sample(900).unwrap();
        let pcm = read_to_end(&mut src).unwrap();
        assert_eq!(pcm.len(), 200);
        assert_eq!(i16::from_le_bytes([pcm[0], pcm[1]]), 900);
    }

    #[test]
    fn test_closure_opener() {
        let opener = |_: &Path| -> Result<Box<dyn PcmSource>> { Ok(Box::new(ramp(4))) };
        let src = opener.open(Path::new("anything")).unwrap();
        assert_eq!(src.sample_duration(), 4);
    }
}
