//! Playback sources — decoded buffers or progressively streamed handles.

use std::fmt;
use std::sync::Arc;

use crate::buffer::AudioBuffer;
use crate::config::DeviceClass;
use crate::error::Result;

/// A progressively decoded source owned by the host (a media element, a
/// network decoder, ...). The session pulls stereo frames from it on every
/// render block.
pub trait StreamHandle {
    /// Fill `left`/`right` with the next frames at the context rate.
    /// Returns how many frames were written; the rest are left untouched.
    fn read(&mut self, left: &mut [f32], right: &mut [f32]) -> Result<usize>;

    /// Native playback position in seconds.
    fn position(&self) -> f64;

    /// Native duration in seconds (0 when unknown).
    fn duration(&self) -> f64;

    fn set_position(&mut self, seconds: f64);

    /// Start or resume delivery. May fail (autoplay policy, network).
    fn play(&mut self) -> Result<()>;

    fn pause(&mut self);

    fn is_ended(&self) -> bool;

    /// Stop, detach, and unload the native resource. Called exactly once,
    /// when the owning session is torn down.
    fn release(&mut self);
}

/// What a session plays.
pub enum Source {
    Decoded(Arc<AudioBuffer>),
    Streamed(Box<dyn StreamHandle>),
}

impl Source {
    pub fn decoded(buffer: AudioBuffer) -> Self {
        Source::Decoded(Arc::new(buffer))
    }

    pub fn streamed(handle: impl StreamHandle + 'static) -> Self {
        Source::Streamed(Box::new(handle))
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Decoded(buf) => f
                .debug_struct("Decoded")
                .field("frames", &buf.frames())
                .field("sample_rate", &buf.sample_rate())
                .finish(),
            Source::Streamed(_) => f.write_str("Streamed"),
        }
    }
}

/// How the caller should turn an encoded payload into a [`Source`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStrategy {
    Decode,
    Stream,
}

impl SourceStrategy {
    /// Stream large payloads on constrained devices, decode everything else.
    pub fn for_payload(device: DeviceClass, payload_bytes: usize) -> Self {
        match device.streaming_threshold_bytes() {
            Some(limit) if payload_bytes > limit => SourceStrategy::Stream,
            _ => SourceStrategy::Decode,
        }
    }
}

/// A [`StreamHandle`] that delivers an in-memory buffer block by block.
///
/// Native hosts use it to exercise the streaming path without a media
/// element; it assumes the buffer is already at the context rate.
#[derive(Debug)]
pub struct MemoryStream {
    buffer: Arc<AudioBuffer>,
    cursor: usize,
    playing: bool,
    released: bool,
}

impl MemoryStream {
    pub fn new(buffer: Arc<AudioBuffer>) -> Self {
        MemoryStream {
            buffer,
            cursor: 0,
            playing: false,
            released: false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl StreamHandle for MemoryStream {
    fn read(&mut self, left: &mut [f32], right: &mut [f32]) -> Result<usize> {
        if !self.playing || self.released {
            return Ok(0);
        }
        let available = self.buffer.frames().saturating_sub(self.cursor);
        let n = left.len().min(right.len()).min(available);
        for i in 0..n {
            let (l, r) = self.buffer.read_stereo((self.cursor + i) as f64);
            left[i] = l;
            right[i] = r;
        }
        self.cursor += n;
        Ok(n)
    }

    fn position(&self) -> f64 {
        self.cursor as f64 / self.buffer.sample_rate()
    }

    fn duration(&self) -> f64 {
        self.buffer.duration()
    }

    fn set_position(&mut self, seconds: f64) {
        let frame = (seconds.max(0.0) * self.buffer.sample_rate()) as usize;
        self.cursor = frame.min(self.buffer.frames());
    }

    fn play(&mut self) -> Result<()> {
        self.playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn is_ended(&self) -> bool {
        self.cursor >= self.buffer.frames()
    }

    fn release(&mut self) {
        self.playing = false;
        self.released = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::STREAMING_THRESHOLD_BYTES;

    #[test]
    fn strategy_streams_only_large_payloads_on_mobile() {
        let big = STREAMING_THRESHOLD_BYTES + 1;
        assert_eq!(SourceStrategy::for_payload(DeviceClass::Mobile, big), SourceStrategy::Stream);
        assert_eq!(
            SourceStrategy::for_payload(DeviceClass::Mobile, STREAMING_THRESHOLD_BYTES),
            SourceStrategy::Decode
        );
        assert_eq!(SourceStrategy::for_payload(DeviceClass::Desktop, big), SourceStrategy::Decode);
    }

    #[test]
    fn memory_stream_delivers_then_ends() {
        let buf = Arc::new(AudioBuffer::mono(vec![0.25; 10], 100.0).unwrap());
        let mut s = MemoryStream::new(buf);
        let (mut l, mut r) = ([0.0; 8], [0.0; 8]);
        assert_eq!(s.read(&mut l, &mut r).unwrap(), 0, "paused stream yields nothing");
        s.play().unwrap();
        assert_eq!(s.read(&mut l, &mut r).unwrap(), 8);
        assert_eq!(l[0], 0.25);
        assert_eq!(r[7], 0.25);
        assert_eq!(s.read(&mut l, &mut r).unwrap(), 2);
        assert!(s.is_ended());
        s.set_position(0.05);
        assert!(!s.is_ended());
        assert!((s.position() - 0.05).abs() < 1e-9);
    }
}
