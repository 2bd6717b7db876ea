//! Ring-buffer streaming playback.
//!
//! A streaming voice owns its [`PcmSource`] and a fixed ring of backend
//! buffers. Every tick it reclaims the buffers the backend has finished,
//! credits their frames to `samples_retired`, refills them from the source and
//! queues them again. The playback position is always
//! `samples_retired + backend offset`, which stays monotonic across buffer
//! retirement because the backend offset is measured from the oldest buffer
//! still queued.
//!
//! Loops are enforced here rather than by the backend: a refill never reads
//! past the loop end, and splices back to the loop start within the same
//! fragment, so one buffer may hold audio from both sides of the boundary.

use std::collections::VecDeque;

use tracing::{debug, warn};

use super::{VoiceState, warn_on_err};
use crate::backend::{AudioBackend, BufferId, SourceId, Transport, TransportState};
use crate::config::RingConfig;
use crate::{Error, PcmSource, Result, SampleFormat};

/// A sample range `[begin, end)` replayed indefinitely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopRange {
    /// First sample of the loop.
    pub begin: u64,
    /// One past the last sample of the loop.
    pub end: u64,
}

impl LoopRange {
    /// Loop length in samples.
    pub fn len(&self) -> u64 {
        self.end - self.begin
    }

    /// Always false for a validated range.
    pub fn is_empty(&self) -> bool {
        self.end <= self.begin
    }
}

/// Contiguous run of asset samples inside one fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: u64,
    frames: u64,
}

/// A buffer currently in the backend queue and what it was filled with.
#[derive(Debug)]
struct Fragment {
    buffer: BufferId,
    frames: u64,
    spans: Vec<Span>,
}

pub(crate) struct StreamingVoice {
    source: SourceId,
    pcm: Box<dyn PcmSource>,
    format: SampleFormat,
    total_samples: u64,
    ring: Vec<BufferId>,
    free: Vec<BufferId>,
    queued: VecDeque<Fragment>,
    scratch: Vec<u8>,
    samples_retired: u64,
    loop_range: Option<LoopRange>,
    decode_failed: bool,
    state: VoiceState,
}

impl std::fmt::Debug for StreamingVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingVoice")
            .field("source", &self.source)
            .field("format", &self.format)
            .field("ring", &self.ring)
            .field("queued", &self.queued.len())
            .field("samples_retired", &self.samples_retired)
            .field("loop_range", &self.loop_range)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl StreamingVoice {
    /// Allocate a source and a ring of buffers for `pcm`. On failure every
    /// backend object created so far is released again.
    pub(crate) fn new(
        backend: &mut dyn AudioBackend,
        pcm: Box<dyn PcmSource>,
        ring: &RingConfig,
    ) -> Result<Self> {
        let format = pcm.format();
        format.validate_for_playback()?;
        let source = backend.create_source()?;
        let mut buffers = Vec::with_capacity(ring.buffers);
        for _ in 0..ring.buffers {
            match backend.create_buffer() {
                Ok(buffer) => buffers.push(buffer),
                Err(e) => {
                    warn_on_err("delete source", backend.delete_source(source));
                    for buffer in buffers {
                        warn_on_err("delete buffer", backend.delete_buffer(buffer));
                    }
                    return Err(e.into());
                }
            }
        }
        let fragment_bytes = format
            .align_bytes(ring.fragment_bytes)
            .max(format.bytes_per_frame());
        let total_samples = pcm.sample_duration();
        let samples_retired = format.bytes_to_frames(pcm.tell_bytes());
        debug!(
            source = %source,
            buffers = buffers.len(),
            fragment_bytes,
            total_samples,
            "streaming voice created"
        );
        Ok(Self {
            source,
            pcm,
            format,
            total_samples,
            free: buffers.iter().rev().copied().collect(),
            ring: buffers,
            queued: VecDeque::new(),
            scratch: vec![0; fragment_bytes],
            samples_retired,
            loop_range: None,
            decode_failed: false,
            state: VoiceState::Paused,
        })
    }

    pub(crate) fn source(&self) -> SourceId {
        self.source
    }

    pub(crate) fn state(&self) -> VoiceState {
        self.state
    }

    pub(crate) fn format(&self) -> SampleFormat {
        self.format
    }

    pub(crate) fn total_samples(&self) -> u64 {
        self.total_samples
    }

    pub(crate) fn loop_range(&self) -> Option<LoopRange> {
        self.loop_range
    }

    pub(crate) fn play(&mut self, backend: &mut dyn AudioBackend) {
        if self.state != VoiceState::Paused {
            return;
        }
        self.service(backend);
        warn_on_err("play", backend.set_transport(self.source, Transport::Play));
        self.state = VoiceState::Playing;
    }

    pub(crate) fn pause(&mut self, backend: &mut dyn AudioBackend) {
        if self.state != VoiceState::Playing {
            return;
        }
        warn_on_err("pause", backend.set_transport(self.source, Transport::Pause));
        self.state = VoiceState::Paused;
    }

    pub(crate) fn finish(&mut self, backend: &mut dyn AudioBackend) {
        if self.state == VoiceState::Finished {
            return;
        }
        let position = self.sample_pos(backend);
        self.flush(backend);
        self.samples_retired = position;
        self.state = VoiceState::Finished;
    }

    pub(crate) fn update(&mut self, backend: &mut dyn AudioBackend) {
        if self.state != VoiceState::Playing {
            return;
        }
        self.service(backend);
        if backend.queued_count(self.source) == 0 {
            debug!(source = %self.source, "stream exhausted");
            self.state = VoiceState::Finished;
        } else if backend.transport_state(self.source) != TransportState::Playing {
            warn!(source = %self.source, "buffer underrun, restarting transport");
            warn_on_err("play", backend.set_transport(self.source, Transport::Play));
        }
    }

    pub(crate) fn seek_to_sample(
        &mut self,
        backend: &mut dyn AudioBackend,
        sample: u64,
    ) -> Result<()> {
        if sample > self.total_samples {
            return Err(Error::SeekOutOfRange {
                target: sample,
                total: self.total_samples,
            });
        }
        if self.state == VoiceState::Finished {
            return Ok(());
        }
        self.flush(backend);
        self.pcm.seek_to_sample(sample)?;
        self.samples_retired = sample;
        self.decode_failed = false;
        if self.state == VoiceState::Playing {
            self.service(backend);
            warn_on_err("play", backend.set_transport(self.source, Transport::Play));
        }
        Ok(())
    }

    pub(crate) fn sample_pos(&self, backend: &dyn AudioBackend) -> u64 {
        if self.state == VoiceState::Finished {
            return self.samples_retired;
        }
        self.samples_retired + backend.sample_offset(self.source)
    }

    /// Position inside the asset, following loop splices.
    pub(crate) fn cursor_pos(&self, backend: &dyn AudioBackend) -> u64 {
        let mut offset = if self.state == VoiceState::Finished {
            0
        } else {
            backend.sample_offset(self.source)
        };
        let mut last_end = None;
        for fragment in &self.queued {
            for span in &fragment.spans {
                if offset < span.frames {
                    return span.start + offset;
                }
                offset -= span.frames;
                last_end = Some(span.start + span.frames);
            }
        }
        last_end.unwrap_or_else(|| self.format.bytes_to_frames(self.pcm.tell_bytes()))
    }

    pub(crate) fn set_loop(&mut self, begin: u64, end: u64) -> Result<()> {
        if begin >= end || end > self.total_samples {
            return Err(Error::InvalidLoop {
                begin,
                end,
                total: self.total_samples,
            });
        }
        self.loop_range = Some(LoopRange { begin, end });
        Ok(())
    }

    pub(crate) fn set_looping(&mut self, looping: bool) -> Result<()> {
        if looping {
            self.set_loop(0, self.total_samples)
        } else {
            self.loop_range = None;
            Ok(())
        }
    }

    pub(crate) fn release(mut self, backend: &mut dyn AudioBackend) {
        self.flush(backend);
        warn_on_err("delete source", backend.delete_source(self.source));
        for buffer in self.ring {
            warn_on_err("delete buffer", backend.delete_buffer(buffer));
        }
    }

    /// Reclaim processed buffers, then refill and requeue every free one.
    fn service(&mut self, backend: &mut dyn AudioBackend) {
        self.reclaim(backend, true);
        self.refill(backend);
    }

    /// Stop transport and take back every queued buffer without playing it.
    fn flush(&mut self, backend: &mut dyn AudioBackend) {
        warn_on_err("stop", backend.set_transport(self.source, Transport::Stop));
        self.reclaim(backend, false);
    }

    fn reclaim(&mut self, backend: &mut dyn AudioBackend, retire: bool) {
        if backend.processed_count(self.source) == 0 {
            return;
        }
        let done = match backend.dequeue_processed(self.source) {
            Ok(done) => done,
            Err(e) => {
                warn!(source = %self.source, error = %e, "dequeue failed");
                return;
            }
        };
        for buffer in done {
            let Some(fragment) = self.queued.pop_front().filter(|f| f.buffer == buffer) else {
                panic!("backend dequeued buffer {buffer} out of queue order");
            };
            if retire {
                self.samples_retired += fragment.frames;
            }
            self.free.push(buffer);
        }
    }

    fn refill(&mut self, backend: &mut dyn AudioBackend) {
        while let Some(&buffer) = self.free.last() {
            if self.decode_failed {
                return;
            }
            let (filled, spans) = match self.fill_fragment() {
                Ok(fill) => fill,
                Err(e) => {
                    warn!(source = %self.source, error = %e, "decode failed, ending stream");
                    self.decode_failed = true;
                    return;
                }
            };
            if filled == 0 {
                return;
            }
            let queued = backend
                .upload(buffer, &self.scratch[..filled], self.format)
                .and_then(|()| backend.enqueue(self.source, buffer));
            if let Err(e) = queued {
                warn!(source = %self.source, error = %e, "failed to queue fragment");
                // put the fragment back so the next refill reads it again
                if let Some(span) = spans.first()
                    && let Err(e) = self.pcm.seek_to_sample(span.start)
                {
                    warn!(source = %self.source, error = %e, "rewind failed");
                }
                return;
            }
            self.free.pop();
            self.queued.push_back(Fragment {
                buffer,
                frames: self.format.bytes_to_frames(filled as u64),
                spans,
            });
        }
    }

    /// Read one fragment into `scratch`, splicing at the loop end.
    fn fill_fragment(&mut self) -> Result<(usize, Vec<Span>)> {
        let capacity = self.scratch.len();
        let mut filled = 0;
        let mut spans: Vec<Span> = Vec::new();
        let mut wraps_without_data = 0;
        while filled < capacity {
            let mut want = capacity - filled;
            if let Some(range) = self.loop_range {
                let end = self.format.frames_to_bytes(range.end);
                let pos = self.pcm.tell_bytes();
                if pos >= end {
                    wraps_without_data += 1;
                    if wraps_without_data > 1 {
                        break;
                    }
                    self.pcm.seek_to_sample(range.begin)?;
                    continue;
                }
                want = want.min((end - pos) as usize);
            }
            let start = self.format.bytes_to_frames(self.pcm.tell_bytes());
            let n = self.pcm.read(&mut self.scratch[filled..filled + want])?;
            if n == 0 {
                // source ended short of the loop end
                match self.loop_range {
                    Some(range) if wraps_without_data == 0 => {
                        wraps_without_data += 1;
                        self.pcm.seek_to_sample(range.begin)?;
                        continue;
                    }
                    _ => break,
                }
            }
            wraps_without_data = 0;
            let frames = self.format.bytes_to_frames(n as u64);
            match spans.last_mut() {
                Some(last) if last.start + last.frames == start => last.frames += frames,
                _ => spans.push(Span { start, frames }),
            }
            filled += n;
        }
        Ok((filled, spans))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemorySource, VirtualBackend};

    const RATE: u32 = 1000;

    /// Ramp whose sample value equals its index.
    fn ramp(frames: usize) -> Box<dyn PcmSource> {
        let samples: Vec<i16> = (0..frames).map(|i| i as i16).collect();
        Box::new(MemorySource::from_i16(&samples, RATE, 1))
    }

    fn small_ring() -> RingConfig {
        RingConfig {
            buffers: 4,
            fragment_bytes: 200,
        }
    }

    fn first_sample(dev: &VirtualBackend, buffer: BufferId) -> i16 {
        let pcm = dev.buffer_pcm(buffer).unwrap();
        i16::from_le_bytes([pcm[0], pcm[1]])
    }

    #[test]
    fn test_play_primes_full_ring() {
        let mut dev = VirtualBackend::new();
        let mut voice = StreamingVoice::new(&mut dev, ramp(1000), &small_ring()).unwrap();
        voice.play(&mut dev);
        assert_eq!(dev.queued_count(voice.source()), 4);
        assert_eq!(dev.transport_state(voice.source()), TransportState::Playing);
        voice.play(&mut dev);
        assert_eq!(dev.queued_count(voice.source()), 4);
    }

    #[test]
    fn test_position_tracks_retired_buffers() {
        let mut dev = VirtualBackend::new();
        let mut voice = StreamingVoice::new(&mut dev, ramp(1000), &small_ring()).unwrap();
        voice.play(&mut dev);
        dev.update(0.25);
        voice.update(&mut dev);
        assert_eq!(voice.samples_retired, 200);
        assert_eq!(voice.sample_pos(&dev), 250);
        assert_eq!(dev.queued_count(voice.source()), 4);
    }

    #[test]
    fn test_eof_finishes_after_drain() {
        let mut dev = VirtualBackend::new();
        let mut voice = StreamingVoice::new(&mut dev, ramp(250), &small_ring()).unwrap();
        voice.play(&mut dev);
        assert_eq!(dev.queued_count(voice.source()), 3);
        for _ in 0..40 {
            dev.update(0.01);
            voice.update(&mut dev);
        }
        assert_eq!(voice.state(), VoiceState::Finished);
        assert_eq!(voice.sample_pos(&dev), 250);
    }

    #[test]
    fn test_fragment_straddles_loop_end() {
        let mut dev = VirtualBackend::new();
        let mut voice = StreamingVoice::new(&mut dev, ramp(1000), &small_ring()).unwrap();
        voice.set_loop(10, 150).unwrap();
        voice.play(&mut dev);
        let queue = dev.queued_buffers(voice.source());
        let second = dev.buffer_pcm(queue[1]).unwrap();
        let values: Vec<i16> = second
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(values[0], 100);
        assert_eq!(values[49], 149);
        assert_eq!(values[50], 10);
        assert!(values.iter().all(|&v| (10..150).contains(&v)));
    }

    #[test]
    fn test_cursor_follows_loop_splice() {
        let mut dev = VirtualBackend::new();
        let mut voice = StreamingVoice::new(&mut dev, ramp(1000), &small_ring()).unwrap();
        voice.set_loop(0, 150).unwrap();
        voice.play(&mut dev);
        dev.update(0.16);
        assert_eq!(voice.cursor_pos(&dev), 10);
        assert_eq!(voice.sample_pos(&dev), 160);
    }

    #[test]
    fn test_invalid_loops_rejected() {
        let mut dev = VirtualBackend::new();
        let mut voice = StreamingVoice::new(&mut dev, ramp(100), &small_ring()).unwrap();
        assert!(matches!(
            voice.set_loop(50, 50),
            Err(Error::InvalidLoop { .. })
        ));
        assert!(matches!(
            voice.set_loop(0, 101),
            Err(Error::InvalidLoop { total: 100, .. })
        ));
        assert!(voice.loop_range().is_none());
        voice.set_looping(true).unwrap();
        assert_eq!(voice.loop_range(), Some(LoopRange { begin: 0, end: 100 }));
    }

    #[test]
    fn test_seek_while_playing_discards_queue() {
        let mut dev = VirtualBackend::new();
        let mut voice = StreamingVoice::new(&mut dev, ramp(1000), &small_ring()).unwrap();
        voice.play(&mut dev);
        dev.update(0.05);
        voice.seek_to_sample(&mut dev, 700).unwrap();
        let queue = dev.queued_buffers(voice.source());
        assert_eq!(queue.len(), 3);
        assert_eq!(first_sample(&dev, queue[0]), 700);
        assert_eq!(voice.sample_pos(&dev), 700);
        assert_eq!(voice.state(), VoiceState::Playing);
    }

    fn samples(dev: &VirtualBackend, buffer: BufferId) -> Vec<i16> {
        dev.buffer_pcm(buffer)
            .unwrap()
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect()
    }

    #[test]
    fn test_pause_resume_continues_in_place() {
        let mut dev = VirtualBackend::new();
        let mut voice = StreamingVoice::new(&mut dev, ramp(1000), &small_ring()).unwrap();
        voice.play(&mut dev);
        dev.update(0.25);
        voice.update(&mut dev);
        assert_eq!(voice.sample_pos(&dev), 250);
        let queue = dev.queued_buffers(voice.source());

        voice.pause(&mut dev);
        dev.update(0.1);
        voice.update(&mut dev);
        assert_eq!(voice.state(), VoiceState::Paused);
        assert_eq!(voice.sample_pos(&dev), 250);
        assert_eq!(voice.samples_retired, 200);

        voice.play(&mut dev);
        assert_eq!(voice.sample_pos(&dev), 250);
        assert_eq!(dev.queued_buffers(voice.source()), queue);
        dev.update(0.1);
        assert_eq!(voice.sample_pos(&dev), 350);
    }

    #[test]
    fn test_loop_change_applies_from_next_refill() {
        let mut dev = VirtualBackend::new();
        let mut voice = StreamingVoice::new(&mut dev, ramp(1000), &small_ring()).unwrap();
        voice.play(&mut dev);
        voice.set_loop(0, 150).unwrap();

        let queue = dev.queued_buffers(voice.source());
        let firsts: Vec<i16> = queue.iter().map(|&b| first_sample(&dev, b)).collect();
        assert_eq!(firsts, [0, 100, 200, 300]);

        dev.update(0.15);
        voice.update(&mut dev);
        let queue = dev.queued_buffers(voice.source());
        assert_eq!(queue.len(), 4);
        let kept: Vec<i16> = queue[..3].iter().map(|&b| first_sample(&dev, b)).collect();
        assert_eq!(kept, [100, 200, 300]);
        let refilled = samples(&dev, queue[3]);
        assert_eq!(refilled[0], 0);
        assert!(refilled.iter().all(|&v| (0..150).contains(&v)));
    }

    #[test]
    fn test_failed_queue_does_not_skip_audio() {
        let mut dev = VirtualBackend::new();
        let mut voice = StreamingVoice::new(&mut dev, ramp(1000), &small_ring()).unwrap();
        voice.play(&mut dev);
        dev.update(0.15);

        dev.set_fail_uploads(true);
        voice.update(&mut dev);
        assert_eq!(dev.queued_count(voice.source()), 3);
        assert_eq!(voice.pcm.tell_bytes(), 800);

        dev.set_fail_uploads(false);
        voice.update(&mut dev);
        let queue = dev.queued_buffers(voice.source());
        assert_eq!(queue.len(), 4);
        assert_eq!(first_sample(&dev, queue[3]), 400);
    }

    #[test]
    fn test_seek_beyond_end_rejected() {
        let mut dev = VirtualBackend::new();
        let mut voice = StreamingVoice::new(&mut dev, ramp(100), &small_ring()).unwrap();
        assert!(matches!(
            voice.seek_to_sample(&mut dev, 101),
            Err(Error::SeekOutOfRange {
                target: 101,
                total: 100
            })
        ));
    }

    #[test]
    fn test_underrun_restarts_transport() {
        let mut dev = VirtualBackend::new();
        let mut voice = StreamingVoice::new(&mut dev, ramp(2000), &small_ring()).unwrap();
        voice.play(&mut dev);
        dev.update(1.0);
        assert_eq!(dev.transport_state(voice.source()), TransportState::Stopped);
        voice.update(&mut dev);
        assert_eq!(voice.state(), VoiceState::Playing);
        assert_eq!(dev.transport_state(voice.source()), TransportState::Playing);
        assert_eq!(dev.play_commands(voice.source()), 2);
        assert_eq!(voice.sample_pos(&dev), 400);
    }

    #[test]
    fn test_finish_keeps_position_and_is_terminal() {
        let mut dev = VirtualBackend::new();
        let mut voice = StreamingVoice::new(&mut dev, ramp(1000), &small_ring()).unwrap();
        voice.play(&mut dev);
        dev.update(0.03);
        voice.finish(&mut dev);
        assert_eq!(voice.state(), VoiceState::Finished);
        assert_eq!(voice.sample_pos(&dev), 30);
        voice.play(&mut dev);
        voice.seek_to_sample(&mut dev, 0).unwrap();
        assert_eq!(voice.state(), VoiceState::Finished);
        assert_eq!(dev.queued_count(voice.source()), 0);
    }

    #[test]
    fn test_release_frees_backend_objects() {
        let mut dev = VirtualBackend::new();
        let mut voice = StreamingVoice::new(&mut dev, ramp(1000), &small_ring()).unwrap();
        voice.play(&mut dev);
        voice.release(&mut dev);
        assert_eq!(dev.live_buffers(), 0);
        assert_eq!(dev.live_sources(), 0);
    }

    #[test]
    fn test_creation_failure_cleans_up() {
        let mut dev = VirtualBackend::new();
        dev.set_fail_buffer_creation(true);
        assert!(StreamingVoice::new(&mut dev, ramp(10), &small_ring()).is_err());
        assert_eq!(dev.live_sources(), 0);
    }

    #[test]
    fn test_unplayable_format_rejected() {
        let mut dev = VirtualBackend::new();
        let pcm = Box::new(MemorySource::new(vec![0u8; 60], SampleFormat::new(RATE, 6, 16)));
        assert!(matches!(
            StreamingVoice::new(&mut dev, pcm, &small_ring()),
            Err(Error::UnsupportedFormat(_))
        ));
        assert_eq!(dev.sources_created(), 0);
    }
}
