//! Whole-clip playback from one shared backend buffer.

use std::rc::Rc;

use tracing::debug;

use super::{VoiceState, warn_on_err};
use crate::backend::{AudioBackend, BufferId, SourceId, Transport, TransportState};
use crate::source::read_to_end;
use crate::{Error, PcmSource, Result, SampleFormat};

/// A fully decoded asset resident in one backend buffer.
///
/// Shared through `Rc` between the manager's cache and every static voice
/// playing it; whoever drops the last reference deletes the buffer.
#[derive(Debug)]
pub(crate) struct StaticBuffer {
    pub(crate) id: BufferId,
    pub(crate) format: SampleFormat,
    pub(crate) frames: u64,
}

impl StaticBuffer {
    /// Decode the rest of `pcm` and upload it.
    pub(crate) fn load(backend: &mut dyn AudioBackend, pcm: &mut dyn PcmSource) -> Result<Self> {
        let format = pcm.format();
        format.validate_for_playback()?;
        let data = read_to_end(pcm)?;
        let id = backend.create_buffer()?;
        if let Err(e) = backend.upload(id, &data, format) {
            warn_on_err("delete buffer", backend.delete_buffer(id));
            return Err(e.into());
        }
        let frames = format.bytes_to_frames(data.len() as u64);
        debug!(buffer = %id, frames, "static buffer loaded");
        Ok(Self { id, format, frames })
    }
}

#[derive(Debug)]
pub(crate) struct StaticVoice {
    source: SourceId,
    buffer: Rc<StaticBuffer>,
    final_pos: u64,
    state: VoiceState,
}

impl StaticVoice {
    pub(crate) fn new(backend: &mut dyn AudioBackend, buffer: Rc<StaticBuffer>) -> Result<Self> {
        let source = backend.create_source()?;
        if let Err(e) = backend.attach_buffer(source, Some(buffer.id)) {
            warn_on_err("delete source", backend.delete_source(source));
            return Err(e.into());
        }
        Ok(Self {
            source,
            buffer,
            final_pos: 0,
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
        self.buffer.format
    }

    pub(crate) fn total_samples(&self) -> u64 {
        self.buffer.frames
    }

    pub(crate) fn play(&mut self, backend: &mut dyn AudioBackend) {
        if self.state != VoiceState::Paused {
            return;
        }
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
        self.final_pos = backend.sample_offset(self.source);
        warn_on_err("stop", backend.set_transport(self.source, Transport::Stop));
        self.state = VoiceState::Finished;
    }

    pub(crate) fn update(&mut self, backend: &mut dyn AudioBackend) {
        if self.state == VoiceState::Playing
            && backend.transport_state(self.source) == TransportState::Stopped
        {
            self.final_pos = self.buffer.frames;
            self.state = VoiceState::Finished;
        }
    }

    pub(crate) fn seek_to_sample(
        &mut self,
        backend: &mut dyn AudioBackend,
        sample: u64,
    ) -> Result<()> {
        if sample > self.buffer.frames {
            return Err(Error::SeekOutOfRange {
                target: sample,
                total: self.buffer.frames,
            });
        }
        if self.state != VoiceState::Finished {
            warn_on_err("seek", backend.set_sample_offset(self.source, sample));
        }
        Ok(())
    }

    pub(crate) fn sample_pos(&self, backend: &dyn AudioBackend) -> u64 {
        match self.state {
            VoiceState::Finished => self.final_pos,
            _ => backend.sample_offset(self.source),
        }
    }

    pub(crate) fn set_looping(&mut self, backend: &mut dyn AudioBackend, looping: bool) {
        warn_on_err("set looping", backend.set_looping(self.source, looping));
    }

    pub(crate) fn release(self, backend: &mut dyn AudioBackend) {
        warn_on_err("stop", backend.set_transport(self.source, Transport::Stop));
        warn_on_err("detach buffer", backend.attach_buffer(self.source, None));
        warn_on_err("delete source", backend.delete_source(self.source));
        if let Ok(buffer) = Rc::try_unwrap(self.buffer) {
            debug!(buffer = %buffer.id, "last user of static buffer released");
            warn_on_err("delete buffer", backend.delete_buffer(buffer.id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemorySource, VirtualBackend};

    fn load(dev: &mut VirtualBackend, frames: usize) -> Rc<StaticBuffer> {
        let samples = vec![0i16; frames];
        let mut pcm = MemorySource::from_i16(&samples, 1000, 1);
        Rc::new(StaticBuffer::load(dev, &mut pcm).unwrap())
    }

    #[test]
    fn test_load_uploads_whole_asset() {
        let mut dev = VirtualBackend::new();
        let buffer = load(&mut dev, 500);
        assert_eq!(buffer.frames, 500);
        assert_eq!(dev.buffer_pcm(buffer.id).unwrap().len(), 1000);
    }

    #[test]
    fn test_plays_to_end_then_finishes() {
        let mut dev = VirtualBackend::new();
        let buffer = load(&mut dev, 100);
        let mut voice = StaticVoice::new(&mut dev, buffer).unwrap();
        voice.play(&mut dev);
        dev.update(0.05);
        voice.update(&mut dev);
        assert_eq!(voice.state(), VoiceState::Playing);
        assert_eq!(voice.sample_pos(&dev), 50);
        dev.update(0.1);
        voice.update(&mut dev);
        assert_eq!(voice.state(), VoiceState::Finished);
        assert_eq!(voice.sample_pos(&dev), 100);
    }

    #[test]
    fn test_native_looping_keeps_playing() {
        let mut dev = VirtualBackend::new();
        let buffer = load(&mut dev, 100);
        let mut voice = StaticVoice::new(&mut dev, buffer).unwrap();
        voice.set_looping(&mut dev, true);
        voice.play(&mut dev);
        dev.update(0.5);
        voice.update(&mut dev);
        assert_eq!(voice.state(), VoiceState::Playing);
    }

    #[test]
    fn test_seek_moves_offset() {
        let mut dev = VirtualBackend::new();
        let buffer = load(&mut dev, 100);
        let mut voice = StaticVoice::new(&mut dev, buffer).unwrap();
        voice.seek_to_sample(&mut dev, 60).unwrap();
        assert_eq!(voice.sample_pos(&dev), 60);
        assert!(voice.seek_to_sample(&mut dev, 101).is_err());
    }

    #[test]
    fn test_shared_buffer_survives_first_release() {
        let mut dev = VirtualBackend::new();
        let buffer = load(&mut dev, 100);
        let id = buffer.id;
        let first = StaticVoice::new(&mut dev, Rc::clone(&buffer)).unwrap();
        let second = StaticVoice::new(&mut dev, buffer).unwrap();
        first.release(&mut dev);
        assert!(dev.buffer_exists(id));
        second.release(&mut dev);
        assert!(!dev.buffer_exists(id));
    }
}
