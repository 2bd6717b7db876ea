//! PCM sample format and sample/byte/time conversions.
//!
//! A "sample" throughout the engine means one frame: one value per channel at
//! a single instant. Byte offsets are always whole frames.

use crate::{Error, Result};

/// Layout of interleaved PCM produced by a [`PcmSource`](crate::PcmSource).
///
/// 8-bit PCM is unsigned, 16-bit PCM is signed little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleFormat {
    /// Frames per second.
    pub rate: u32,
    /// Interleaved channel count.
    pub channels: u16,
    /// Bits per channel sample.
    pub bits_per_sample: u16,
}

impl SampleFormat {
    /// Create a format description.
    pub const fn new(rate: u32, channels: u16, bits_per_sample: u16) -> Self {
        Self {
            rate,
            channels,
            bits_per_sample,
        }
    }

    /// Mono 16-bit at the given rate.
    pub const fn mono16(rate: u32) -> Self {
        Self::new(rate, 1, 16)
    }

    /// Stereo 16-bit at the given rate.
    pub const fn stereo16(rate: u32) -> Self {
        Self::new(rate, 2, 16)
    }

    /// Bytes occupied by one frame.
    pub fn bytes_per_frame(&self) -> usize {
        usize::from(self.channels) * usize::from(self.bits_per_sample) / 8
    }

    /// Byte length of `frames` frames.
    pub fn frames_to_bytes(&self, frames: u64) -> u64 {
        frames * self.bytes_per_frame() as u64
    }

    /// Whole frames contained in `bytes` bytes.
    pub fn bytes_to_frames(&self, bytes: u64) -> u64 {
        match self.bytes_per_frame() {
            0 => 0,
            n => bytes / n as u64,
        }
    }

    /// Duration of `frames` frames in seconds.
    pub fn frames_to_secs(&self, frames: u64) -> f64 {
        if self.rate == 0 {
            return 0.0;
        }
        frames as f64 / f64::from(self.rate)
    }

    /// Frame index at `secs` seconds, rounded down.
    pub fn secs_to_frames(&self, secs: f64) -> u64 {
        if secs <= 0.0 {
            return 0;
        }
        (secs * f64::from(self.rate)) as u64
    }

    /// Round `bytes` down to a whole number of frames.
    pub fn align_bytes(&self, bytes: usize) -> usize {
        match self.bytes_per_frame() {
            0 => 0,
            n => bytes - bytes % n,
        }
    }

    /// Check that a backend can accept this layout: 1 or 2 channels of 8- or
    /// 16-bit PCM at a nonzero rate.
    pub fn validate_for_playback(&self) -> Result<()> {
        if self.rate == 0 {
            return Err(Error::UnsupportedFormat("sample rate 0".into()));
        }
        if !matches!(self.channels, 1 | 2) {
            return Err(Error::UnsupportedFormat(format!(
                "{} channels",
                self.channels
            )));
        }
        if !matches!(self.bits_per_sample, 8 | 16) {
            return Err(Error::UnsupportedFormat(format!(
                "{}-bit samples",
                self.bits_per_sample
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let layout = match self.channels {
            1 => "mono".to_string(),
            2 => "stereo".to_string(),
            n => format!("{n} ch"),
        };
        write!(f, "{} Hz, {}, {}-bit", self.rate, layout, self.bits_per_sample)
    }
}
