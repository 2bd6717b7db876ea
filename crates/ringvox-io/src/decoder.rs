//! Compressed audio decoding using symphonia.
//!
//! Any container and codec symphonia is built with (Ogg Vorbis, FLAC, MP3,
//! and WAV among others) decodes to interleaved signed 16-bit PCM. Seeking
//! is sample-accurate: the demuxer seeks to the packet holding the target and
//! the decoded frames in front of it are dropped.

use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;

use ringvox_core::{Error, PcmSource, Result, SampleFormat};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::error::from_symphonia;

/// PCM from a compressed stream.
pub struct CompressedSource {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    format: SampleFormat,
    total_frames: u64,
    /// Frames handed out so far, counted from the start of the stream.
    position: u64,
    /// Decoded frames with a timestamp below this are dropped.
    discard_before: u64,
    pending: Vec<u8>,
    pending_offset: usize,
    samples: Option<SampleBuffer<i16>>,
    exhausted: bool,
}

impl std::fmt::Debug for CompressedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressedSource")
            .field("track_id", &self.track_id)
            .field("format", &self.format)
            .field("total_frames", &self.total_frames)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

impl CompressedSource {
    /// Open a compressed file, using its extension as a format hint.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }
        Self::new(Box::new(file), &hint)
    }

    /// Probe `source` and prepare a decoder for its first audio track.
    ///
    /// The container must report the track length; streams of unknown length
    /// are refused.
    pub fn new(source: Box<dyn MediaSource>, hint: &Hint) -> Result<Self> {
        let stream = MediaSourceStream::new(source, Default::default());
        let detected = symphonia::default::get_probe()
            .format(
                hint,
                stream,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| match e {
                SymphoniaError::Unsupported(_) => Error::UnknownFormat,
                other => from_symphonia(other),
            })?;
        let reader = detected.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::UnsupportedFormat("no audio track".into()))?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let rate = params
            .sample_rate
            .ok_or_else(|| Error::decode("track has no sample rate"))?;
        let channels = params
            .channels
            .map(|c| c.count())
            .ok_or_else(|| Error::decode("track has no channel layout"))?;
        let channels = u16::try_from(channels)
            .map_err(|_| Error::UnsupportedFormat(format!("{channels} channels")))?;
        let total_frames = params
            .n_frames
            .ok_or(Error::Unsupported("streams of unknown length"))?;

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(from_symphonia)?;

        let format = SampleFormat::new(rate, channels, 16);
        debug!(track = track_id, %format, total_frames, "compressed stream opened");
        Ok(Self {
            reader,
            decoder,
            track_id,
            format,
            total_frames,
            position: 0,
            discard_before: 0,
            pending: Vec::new(),
            pending_offset: 0,
            samples: None,
            exhausted: false,
        })
    }

    /// Decode packets until one yields frames. Returns `false` at end of
    /// stream.
    fn decode_next(&mut self) -> Result<bool> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                Err(e) => return Err(from_symphonia(e)),
            };
            if packet.track_id() != self.track_id {
                continue;
            }
            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(msg)) => {
                    warn!(error = msg, ts = packet.ts(), "skipping undecodable packet");
                    continue;
                }
                Err(e) => return Err(from_symphonia(e)),
            };
            let frames = decoded.frames() as u64;
            let end = packet.ts() + frames;
            if frames == 0 || end <= self.discard_before {
                continue;
            }

            let spec = *decoded.spec();
            let needed = decoded.capacity() * spec.channels.count();
            if self.samples.as_ref().is_none_or(|b| b.capacity() < needed) {
                self.samples = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
            }
            let Some(samples) = self.samples.as_mut() else {
                continue;
            };
            samples.copy_interleaved_ref(decoded);

            let skip = self.discard_before.saturating_sub(packet.ts()) as usize;
            let channels = usize::from(self.format.channels);
            self.pending.clear();
            self.pending_offset = 0;
            for sample in &samples.samples()[skip * channels..] {
                self.pending.extend_from_slice(&sample.to_le_bytes());
            }
            return Ok(true);
        }
    }
}

impl PcmSource for CompressedSource {
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
        let mut written = 0;
        while buf.len() - written >= bytes_per_frame && self.position < self.total_frames {
            if self.pending_offset >= self.pending.len() {
                if self.exhausted || !self.decode_next()? {
                    self.exhausted = true;
                    break;
                }
                continue;
            }
            let left = usize::try_from(
                self.format
                    .frames_to_bytes(self.total_frames - self.position),
            )
            .unwrap_or(usize::MAX);
            let n = self.format.align_bytes(
                (self.pending.len() - self.pending_offset)
                    .min(buf.len() - written)
                    .min(left),
            );
            if n == 0 {
                break;
            }
            buf[written..written + n]
                .copy_from_slice(&self.pending[self.pending_offset..self.pending_offset + n]);
            self.pending_offset += n;
            written += n;
            self.position += (n / bytes_per_frame) as u64;
        }
        Ok(written)
    }

    fn seek_to_sample(&mut self, sample: u64) -> Result<()> {
        if sample > self.total_frames {
            return Err(Error::SeekOutOfRange {
                target: sample,
                total: self.total_frames,
            });
        }
        self.pending.clear();
        self.pending_offset = 0;
        self.position = sample;
        if sample == self.total_frames {
            self.exhausted = true;
            return Ok(());
        }
        self.reader
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts: sample,
                    track_id: self.track_id,
                },
            )
            .map_err(from_symphonia)?;
        self.decoder.reset();
        self.discard_before = sample;
        self.exhausted = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// A mono 16-bit ramp as WAV bytes, which symphonia also demuxes.
    fn ramp_wav(frames: i16) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..frames {
                writer.write_sample(i).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn source(frames: i16) -> CompressedSource {
        let mut hint = Hint::new();
        hint.with_extension("wav");
        CompressedSource::new(Box::new(Cursor::new(ramp_wav(frames))), &hint).unwrap()
    }

    fn read_all(source: &mut CompressedSource) -> Vec<i16> {
        ringvox_core::read_to_end(source)
            .unwrap()
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    #[test]
    fn decodes_full_length() {
        let mut src = source(5000);
        assert_eq!(src.format(), SampleFormat::mono16(22050));
        assert_eq!(src.sample_duration(), 5000);
        let samples = read_all(&mut src);
        assert_eq!(samples.len(), 5000);
        assert!(samples.iter().enumerate().all(|(i, &s)| s == i as i16));
        assert!(src.is_eof());
    }

    #[test]
    fn seek_lands_on_exact_sample() {
        let mut src = source(5000);
        let mut buf = [0u8; 2];
        for target in [4321u64, 17, 2500] {
            src.seek_to_sample(target).unwrap();
            assert_eq!(src.read(&mut buf).unwrap(), 2);
            assert_eq!(i16::from_le_bytes(buf), target as i16);
        }
    }

    #[test]
    fn seek_to_end_reads_nothing() {
        let mut src = source(100);
        src.seek_to_sample(100).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(src.read(&mut buf).unwrap(), 0);
        assert!(src.seek_to_sample(101).is_err());
        src.seek_to_sample(0).unwrap();
        assert_eq!(read_all(&mut src).len(), 100);
    }

    #[test]
    fn unrecognized_bytes_are_unknown_format() {
        let err = CompressedSource::new(
            Box::new(Cursor::new(vec![0x42u8; 512])),
            &Hint::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownFormat));
    }
}
