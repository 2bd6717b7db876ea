//! Procedural sine tone.

use std::f64::consts::TAU;

use ringvox_core::{Error, PcmSource, Result, SampleFormat};

/// Output rate of every tone.
const TONE_RATE: u32 = 48000;

/// A sine tone rendered on demand as mono 16-bit PCM at 48 kHz.
///
/// Sample `n` depends only on `n`, so seeking is exact and free.
#[derive(Debug, Clone)]
pub struct ToneSource {
    frequency: f64,
    amplitude: f64,
    total_frames: u64,
    position: u64,
}

impl ToneSource {
    /// A full-scale tone of `frequency` Hz lasting `duration` seconds.
    pub fn new(frequency: f64, duration: f64) -> Self {
        let format = SampleFormat::mono16(TONE_RATE);
        Self {
            frequency,
            amplitude: 1.0,
            total_frames: format.secs_to_frames(duration.max(0.0)),
            position: 0,
        }
    }

    /// Scale the tone; clamped to `0.0..=1.0`.
    pub fn with_amplitude(mut self, amplitude: f64) -> Self {
        self.amplitude = amplitude.clamp(0.0, 1.0);
        self
    }

    /// Tone frequency in Hz.
    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    fn sample_at(&self, n: u64) -> i16 {
        let t = n as f64 / f64::from(TONE_RATE);
        let value = (TAU * self.frequency * t).sin() * self.amplitude;
        (value * f64::from(i16::MAX)).round() as i16
    }
}

impl PcmSource for ToneSource {
    fn format(&self) -> SampleFormat {
        SampleFormat::mono16(TONE_RATE)
    }

    fn total_bytes(&self) -> u64 {
        self.total_frames * 2
    }

    fn tell_bytes(&self) -> u64 {
        self.position * 2
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let frames = ((buf.len() / 2) as u64).min(self.total_frames - self.position);
        for (i, chunk) in buf.chunks_exact_mut(2).take(frames as usize).enumerate() {
            let sample = self.sample_at(self.position + i as u64);
            chunk.copy_from_slice(&sample.to_le_bytes());
        }
        self.position += frames;
        Ok(frames as usize * 2)
    }

    fn seek_to_sample(&mut self, sample: u64) -> Result<()> {
        if sample > self.total_frames {
            return Err(Error::SeekOutOfRange {
                target: sample,
                total: self.total_frames,
            });
        }
        self.position = sample;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_and_format() {
        let tone = ToneSource::new(440.0, 0.5);
        assert_eq!(tone.format(), SampleFormat::mono16(48000));
        assert_eq!(tone.sample_duration(), 24000);
        assert!((tone.duration() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_quarter_period_peaks() {
        // 12 kHz at 48 kHz: samples go 0, +max, 0, -max
        let mut tone = ToneSource::new(12000.0, 1.0);
        let mut buf = [0u8; 8];
        assert_eq!(tone.read(&mut buf).unwrap(), 8);
        let s: Vec<i16> = buf
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(s[0], 0);
        assert_eq!(s[1], i16::MAX);
        assert_eq!(s[3], -i16::MAX);
    }

    #[test]
    fn test_seek_matches_linear_read() {
        let mut linear = ToneSource::new(997.0, 0.1).with_amplitude(0.5);
        let mut seeked = linear.clone();
        let mut a = vec![0u8; 2000];
        linear.read(&mut a).unwrap();
        seeked.seek_to_sample(500).unwrap();
        let mut b = [0u8; 2];
        seeked.read(&mut b).unwrap();
        assert_eq!(b, [a[1000], a[1001]]);
    }

    #[test]
    fn test_stops_at_duration() {
        let mut tone = ToneSource::new(440.0, 0.001);
        let mut buf = [0u8; 1000];
        assert_eq!(tone.read(&mut buf).unwrap(), 96);
        assert!(tone.is_eof());
        assert_eq!(tone.read(&mut buf).unwrap(), 0);
    }
}
