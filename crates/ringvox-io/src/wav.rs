//! WAV decoding.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use hound::WavReader;
use ringvox_core::{Error, PcmSource, Result, SampleFormat};

use crate::error::from_hound;

/// How stored samples map onto output PCM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    /// 8-bit integer, emitted as unsigned 8-bit.
    Int8,
    /// Integer of the given width, emitted as signed 16-bit.
    Int(u16),
    /// 32-bit float, emitted as signed 16-bit.
    Float,
}

/// PCM from a RIFF/WAVE stream.
///
/// 8-bit files keep their width; every other integer width and 32-bit float
/// is converted to signed 16-bit.
pub struct WavSource<R: Read + Seek> {
    reader: WavReader<R>,
    format: SampleFormat,
    encoding: Encoding,
    total_frames: u64,
    position: u64,
}

impl<R: Read + Seek> std::fmt::Debug for WavSource<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WavSource")
            .field("format", &self.format)
            .field("encoding", &self.encoding)
            .field("total_frames", &self.total_frames)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

impl WavSource<BufReader<File>> {
    /// Open a WAV file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> WavSource<R> {
    /// Parse the header of a WAV stream positioned at its first byte.
    pub fn new(reader: R) -> Result<Self> {
        let reader = WavReader::new(reader).map_err(from_hound)?;
        let spec = reader.spec();
        let encoding = match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Float, 32) => Encoding::Float,
            (hound::SampleFormat::Int, 8) => Encoding::Int8,
            (hound::SampleFormat::Int, bits @ 9..=32) => Encoding::Int(bits),
            (kind, bits) => {
                return Err(Error::UnsupportedFormat(format!(
                    "{bits}-bit {kind:?} WAV samples"
                )));
            }
        };
        let output_bits = if encoding == Encoding::Int8 { 8 } else { 16 };
        let format = SampleFormat::new(spec.sample_rate, spec.channels, output_bits);
        Ok(Self {
            total_frames: u64::from(reader.duration()),
            reader,
            format,
            encoding,
            position: 0,
        })
    }

    /// Bit depth stored in the file, before conversion.
    pub fn source_bits(&self) -> u16 {
        self.reader.spec().bits_per_sample
    }
}

/// Scale an integer sample of `bits` width to 16 bits.
fn int_to_i16(value: i32, bits: u16) -> i16 {
    if bits >= 16 {
        (value >> (bits - 16)) as i16
    } else {
        (value << (16 - bits)) as i16
    }
}

fn float_to_i16(value: f32) -> i16 {
    (value.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
}

impl<R: Read + Seek> PcmSource for WavSource<R> {
    fn format(&self) -> SampleFormat {
        self.format
    }

    fn total_bytes(&self) -> u64 {
        self.format.frames_to_bytes(self.total_frames)
    }

    fn tell_bytes(&self) -> u64 {
        self.format.frames_to_bytes(self.position)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let bytes_per_frame = self.format.bytes_per_frame();
        let remaining = self.total_frames - self.position;
        let frames = ((buf.len() / bytes_per_frame) as u64).min(remaining) as usize;
        let count = frames * usize::from(self.format.channels);
        let mut out = 0;
        match self.encoding {
            Encoding::Int8 => {
                for sample in self.reader.samples::<i32>().take(count) {
                    buf[out] = (sample.map_err(from_hound)? + 128) as u8;
                    out += 1;
                }
            }
            Encoding::Int(bits) => {
                for sample in self.reader.samples::<i32>().take(count) {
                    let value = int_to_i16(sample.map_err(from_hound)?, bits);
                    buf[out..out + 2].copy_from_slice(&value.to_le_bytes());
                    out += 2;
                }
            }
            Encoding::Float => {
                for sample in self.reader.samples::<f32>().take(count) {
                    let value = float_to_i16(sample.map_err(from_hound)?);
                    buf[out..out + 2].copy_from_slice(&value.to_le_bytes());
                    out += 2;
                }
            }
        }
        let frames_read = out / bytes_per_frame;
        self.position += frames_read as u64;
        Ok(frames_read * bytes_per_frame)
    }

    fn seek_to_sample(&mut self, sample: u64) -> Result<()> {
        if sample > self.total_frames {
            return Err(Error::SeekOutOfRange {
                target: sample,
                total: self.total_frames,
            });
        }
        // total_frames came from a u32, so the target fits
        self.reader.seek(sample as u32)?;
        self.position = sample;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    type Writer<'a> = hound::WavWriter<&'a mut Cursor<Vec<u8>>>;

    fn wav_bytes(spec: hound::WavSpec, write: impl FnOnce(&mut Writer<'_>)) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            write(&mut writer);
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn spec(channels: u16, bits: u16, sample_format: hound::SampleFormat) -> hound::WavSpec {
        hound::WavSpec {
            channels,
            sample_rate: 8000,
            bits_per_sample: bits,
            sample_format,
        }
    }

    #[test]
    fn sixteen_bit_passes_through() {
        let data = wav_bytes(spec(2, 16, hound::SampleFormat::Int), |w| {
            for i in 0..20i16 {
                w.write_sample(i * 100).unwrap();
            }
        });
        let mut source = WavSource::new(Cursor::new(data)).unwrap();
        assert_eq!(source.format(), SampleFormat::stereo16(8000));
        assert_eq!(source.sample_duration(), 10);

        let mut buf = [0u8; 8];
        assert_eq!(source.read(&mut buf).unwrap(), 8);
        assert_eq!(i16::from_le_bytes([buf[6], buf[7]]), 300);
    }

    #[test]
    fn eight_bit_stays_unsigned() {
        let data = wav_bytes(spec(1, 8, hound::SampleFormat::Int), |w| {
            for v in [-128i8, 0, 127] {
                w.write_sample(v).unwrap();
            }
        });
        let mut source = WavSource::new(Cursor::new(data)).unwrap();
        assert_eq!(source.format().bits_per_sample, 8);
        let mut buf = [0u8; 3];
        assert_eq!(source.read(&mut buf).unwrap(), 3);
        assert_eq!(buf, [0, 128, 255]);
    }

    #[test]
    fn wide_int_and_float_narrow_to_sixteen_bits() {
        let data = wav_bytes(spec(1, 24, hound::SampleFormat::Int), |w| {
            w.write_sample(0x12_3400i32).unwrap();
        });
        let mut source = WavSource::new(Cursor::new(data)).unwrap();
        assert_eq!(source.source_bits(), 24);
        let mut buf = [0u8; 2];
        source.read(&mut buf).unwrap();
        assert_eq!(i16::from_le_bytes(buf), 0x1234);

        let data = wav_bytes(spec(1, 32, hound::SampleFormat::Float), |w| {
            w.write_sample(1.5f32).unwrap();
            w.write_sample(-0.5f32).unwrap();
        });
        let mut source = WavSource::new(Cursor::new(data)).unwrap();
        let mut buf = [0u8; 4];
        source.read(&mut buf).unwrap();
        assert_eq!(i16::from_le_bytes([buf[0], buf[1]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([buf[2], buf[3]]), -16383);
    }

    #[test]
    fn seek_is_sample_accurate() {
        let data = wav_bytes(spec(1, 16, hound::SampleFormat::Int), |w| {
            for i in 0..100i16 {
                w.write_sample(i).unwrap();
            }
        });
        let mut source = WavSource::new(Cursor::new(data)).unwrap();
        let mut buf = [0u8; 2];
        for target in [73u64, 5, 73] {
            source.seek_to_sample(target).unwrap();
            assert_eq!(source.tell_bytes(), target * 2);
            source.read(&mut buf).unwrap();
            assert_eq!(i16::from_le_bytes(buf), target as i16);
        }
        source.seek_to_sample(100).unwrap();
        assert!(source.is_eof());
        assert_eq!(source.read(&mut buf).unwrap(), 0);
        assert!(matches!(
            source.seek_to_sample(101),
            Err(Error::SeekOutOfRange { .. })
        ));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = WavSource::new(Cursor::new(b"not a wav file at all".to_vec())).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }
}
