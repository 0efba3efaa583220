//! Processing context — the sample clock every timer in the engine reads.

/// Sample-accurate clock, advanced only by rendered frames.
///
/// A suspended context renders silence and its clock stands still, like a
/// suspended WebAudio `AudioContext`.
#[derive(Debug, Clone)]
pub struct ProcessingContext {
    sample_rate: f64,
    frames: u64,
    suspended: bool,
}

impl ProcessingContext {
    pub fn new(sample_rate: f64) -> Self {
        ProcessingContext {
            sample_rate,
            frames: 0,
            suspended: false,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Seconds of audio rendered so far.
    pub fn current_time(&self) -> f64 {
        self.frames as f64 / self.sample_rate
    }

    pub fn advance(&mut self, frames: usize) {
        if !self.suspended {
            self.frames += frames as u64;
        }
    }

    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    /// Resume a suspended context. Returns whether it was suspended.
    pub fn resume(&mut self) -> bool {
        std::mem::replace(&mut self.suspended, false)
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }
}
