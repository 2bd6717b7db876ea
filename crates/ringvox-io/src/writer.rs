//! Draining a source to disk.

use std::io::Write;
use std::path::Path;

use hound::{SampleFormat as HoundFormat, WavSpec, WavWriter};
use ringvox_core::{Error, PcmSource, Result};

use crate::error::from_hound;

/// Bytes pulled from the source per read.
const CHUNK_BYTES: usize = 64 * 1024;

/// Decode the rest of `source` into a WAV file. Returns the frames written.
pub fn write_wav<P: AsRef<Path>>(path: P, source: &mut dyn PcmSource) -> Result<u64> {
    let format = source.format();
    format.validate_for_playback()?;
    let spec = WavSpec {
        channels: format.channels,
        sample_rate: format.rate,
        bits_per_sample: format.bits_per_sample,
        sample_format: HoundFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).map_err(from_hound)?;
    let mut chunk = vec![0u8; format.align_bytes(CHUNK_BYTES)];
    let mut bytes = 0u64;
    loop {
        let n = source.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        if format.bits_per_sample == 8 {
            for &b in &chunk[..n] {
                // hound takes 8-bit samples signed and stores them unsigned
                writer
                    .write_sample((i16::from(b) - 128) as i8)
                    .map_err(from_hound)?;
            }
        } else {
            for pair in chunk[..n].chunks_exact(2) {
                writer
                    .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                    .map_err(from_hound)?;
            }
        }
        bytes += n as u64;
    }
    writer.finalize().map_err(from_hound)?;
    Ok(format.bytes_to_frames(bytes))
}

/// Copy the rest of `source` to `out` as headerless PCM. Returns the bytes
/// written.
pub fn write_raw<W: Write>(out: &mut W, source: &mut dyn PcmSource) -> Result<u64> {
    let format = source.format();
    let mut chunk = vec![0u8; format.align_bytes(CHUNK_BYTES).max(format.bytes_per_frame())];
    if chunk.is_empty() {
        return Err(Error::UnsupportedFormat(format!("{format}")));
    }
    let mut bytes = 0u64;
    loop {
        let n = source.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        out.write_all(&chunk[..n])?;
        bytes += n as u64;
    }
    out.flush()?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringvox_core::{MemorySource, SampleFormat};

    #[test]
    fn raw_output_is_the_source_bytes() {
        let mut src = MemorySource::from_i16(&[1, -2, 3, -4], 8000, 2);
        let mut out = Vec::new();
        assert_eq!(write_raw(&mut out, &mut src).unwrap(), 8);
        assert_eq!(out, src.data());
    }

    #[test]
    fn raw_output_starts_at_current_position() {
        let mut src = MemorySource::from_i16(&[10, 20, 30, 40], 8000, 1);
        src.seek_to_sample(3).unwrap();
        let mut out = Vec::new();
        write_raw(&mut out, &mut src).unwrap();
        assert_eq!(out, 40i16.to_le_bytes());
    }

    #[test]
    fn wav_rejects_unplayable_layouts() {
        let dir = tempfile::tempdir().unwrap();
        let mut src = MemorySource::new(vec![0u8; 12], SampleFormat::new(8000, 6, 16));
        assert!(matches!(
            write_wav(dir.path().join("x.wav"), &mut src),
            Err(Error::UnsupportedFormat(_))
        ));
    }
}
