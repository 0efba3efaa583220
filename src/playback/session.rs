//! A single playback session: one source attached to the graph input.

use std::sync::Arc;

use super::source::{Source, StreamHandle};
use crate::buffer::AudioBuffer;
use crate::error::Result;

/// Which kind of source is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    Buffer,
    Stream,
    None,
}

enum ActiveSource {
    Buffer {
        buffer: Arc<AudioBuffer>,
        /// Fractional read position in buffer frames.
        cursor: f64,
    },
    Stream(Box<dyn StreamHandle>),
}

/// Outcome of pulling one render block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    Playing,
    Ended,
}

/// Owns exactly one source. Dropping a session releases its native
/// resource, so replacing the controller's session cannot leak the old one.
pub struct PlaybackSession {
    source: ActiveSource,
    /// Position (seconds) when the session last started or paused.
    offset: f64,
    /// Context time at which the session last started.
    started_at: f64,
    running: bool,
}

impl PlaybackSession {
    /// Attach `source` at `offset` seconds and start it at context time `now`.
    pub fn start(source: Source, offset: f64, now: f64) -> Result<Self> {
        let offset = offset.max(0.0);
        let source = match source {
            Source::Decoded(buffer) => {
                let offset = offset.min(buffer.duration());
                let cursor = offset * buffer.sample_rate();
                ActiveSource::Buffer { buffer, cursor }
            }
            Source::Streamed(mut handle) => {
                handle.set_position(offset);
                if let Err(e) = handle.play() {
                    handle.release();
                    return Err(e);
                }
                ActiveSource::Stream(handle)
            }
        };
        Ok(PlaybackSession {
            source,
            offset,
            started_at: now,
            running: true,
        })
    }

    pub fn mode(&self) -> PlaybackMode {
        match self.source {
            ActiveSource::Buffer { .. } => PlaybackMode::Buffer,
            ActiveSource::Stream(_) => PlaybackMode::Stream,
        }
    }

    /// The attached buffer, if this is a buffer session.
    pub fn buffer(&self) -> Option<&Arc<AudioBuffer>> {
        match &self.source {
            ActiveSource::Buffer { buffer, .. } => Some(buffer),
            ActiveSource::Stream(_) => None,
        }
    }

    pub fn duration(&self) -> f64 {
        match &self.source {
            ActiveSource::Buffer { buffer, .. } => buffer.duration(),
            ActiveSource::Stream(handle) => handle.duration(),
        }
    }

    /// Playback position in seconds at context time `now`.
    pub fn current_time(&self, now: f64) -> f64 {
        match &self.source {
            ActiveSource::Buffer { buffer, .. } => {
                let elapsed = if self.running {
                    (now - self.started_at).max(0.0)
                } else {
                    0.0
                };
                (self.offset + elapsed).min(buffer.duration())
            }
            ActiveSource::Stream(handle) => handle.position(),
        }
    }

    /// Reposition a stream in place. Buffer sessions only move their
    /// stored offset; running buffers are restarted by the controller.
    pub fn reposition(&mut self, seconds: f64) {
        let seconds = seconds.max(0.0);
        match &mut self.source {
            ActiveSource::Stream(handle) => handle.set_position(seconds),
            ActiveSource::Buffer { buffer, cursor } => {
                self.offset = seconds.min(buffer.duration());
                *cursor = self.offset * buffer.sample_rate();
            }
        }
    }

    pub fn pause(&mut self, now: f64) {
        if !self.running {
            return;
        }
        self.offset = self.current_time(now);
        self.running = false;
        if let ActiveSource::Stream(handle) = &mut self.source {
            handle.pause();
        }
    }

    pub fn resume(&mut self, now: f64) -> Result<()> {
        if self.running {
            return Ok(());
        }
        match &mut self.source {
            ActiveSource::Buffer { buffer, cursor } => {
                *cursor = self.offset * buffer.sample_rate();
            }
            ActiveSource::Stream(handle) => handle.play()?,
        }
        self.started_at = now;
        self.running = true;
        Ok(())
    }

    /// Write the next block into `left`/`right`, resampling buffers to
    /// `context_rate`. Frames past the end are zeroed.
    pub fn pull(&mut self, left: &mut [f32], right: &mut [f32], context_rate: f64) -> Result<Pull> {
        if !self.running {
            left.fill(0.0);
            right.fill(0.0);
            return Ok(Pull::Playing);
        }
        match &mut self.source {
            ActiveSource::Buffer { buffer, cursor } => {
                let step = buffer.sample_rate() / context_rate;
                let end = buffer.frames() as f64;
                for (l, r) in left.iter_mut().zip(right.iter_mut()) {
                    if *cursor >= end {
                        *l = 0.0;
                        *r = 0.0;
                    } else {
                        (*l, *r) = buffer.read_stereo(*cursor);
                        *cursor += step;
                    }
                }
                Ok(if *cursor >= end { Pull::Ended } else { Pull::Playing })
            }
            ActiveSource::Stream(handle) => {
                let written = handle.read(left, right)?;
                let frames = left.len().min(right.len());
                left[written.min(frames)..].fill(0.0);
                right[written.min(frames)..].fill(0.0);
                Ok(if handle.is_ended() { Pull::Ended } else { Pull::Playing })
            }
        }
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        if let ActiveSource::Stream(handle) = &mut self.source {
            handle.release();
        }
    }
}

impl std::fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("mode", &self.mode())
            .field("offset", &self.offset)
            .field("started_at", &self.started_at)
            .field("running", &self.running)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::source::MemoryStream;

    fn ramp(frames: usize, rate: f64) -> Arc<AudioBuffer> {
        let samples = (0..frames).map(|i| i as f32).collect();
        Arc::new(AudioBuffer::mono(samples, rate).unwrap())
    }

    #[test]
    fn buffer_clock_is_offset_plus_elapsed_clamped() {
        let s = PlaybackSession::start(Source::Decoded(ramp(1000, 100.0)), 2.0, 5.0).unwrap();
        assert_eq!(s.mode(), PlaybackMode::Buffer);
        assert!((s.current_time(6.5) - 3.5).abs() < 1e-9);
        assert_eq!(s.current_time(100.0), 10.0);
    }

    #[test]
    fn buffer_pull_resamples_and_ends() {
        // Buffer at half the context rate: every frame is read twice-ish.
        let mut s = PlaybackSession::start(Source::Decoded(ramp(4, 50.0)), 0.0, 0.0).unwrap();
        let (mut l, mut r) = ([0.0; 6], [0.0; 6]);
        assert_eq!(s.pull(&mut l, &mut r, 100.0).unwrap(), Pull::Playing);
        assert_eq!(l, [0.0, 0.5, 1.0, 1.5, 2.0, 2.5]);
        assert_eq!(r, l);
        assert_eq!(s.pull(&mut l, &mut r, 100.0).unwrap(), Pull::Ended);
    }

    #[test]
    fn paused_session_is_silent_and_keeps_offset() {
        let mut s = PlaybackSession::start(Source::Decoded(ramp(1000, 100.0)), 0.0, 0.0).unwrap();
        s.pause(1.5);
        assert!((s.current_time(9.0) - 1.5).abs() < 1e-9);
        let (mut l, mut r) = ([1.0; 4], [1.0; 4]);
        s.pull(&mut l, &mut r, 100.0).unwrap();
        assert_eq!(l, [0.0; 4]);
        s.resume(10.0).unwrap();
        s.pull(&mut l, &mut r, 100.0).unwrap();
        assert_eq!(l[0], 150.0);
    }

    #[test]
    fn stream_session_delegates_and_zero_fills() {
        let buf = ramp(3, 100.0);
        let s = Source::streamed(MemoryStream::new(buf));
        let mut s = PlaybackSession::start(s, 0.0, 0.0).unwrap();
        assert_eq!(s.mode(), PlaybackMode::Stream);
        let (mut l, mut r) = ([9.0; 5], [9.0; 5]);
        assert_eq!(s.pull(&mut l, &mut r, 100.0).unwrap(), Pull::Ended);
        assert_eq!(l, [0.0, 1.0, 2.0, 0.0, 0.0]);
        assert!((s.current_time(123.0) - 0.03).abs() < 1e-9);
    }
}
