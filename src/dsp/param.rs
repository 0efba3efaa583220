//! Smoothed parameters with `setTargetAtTime` semantics.
//!
//! Every live control in the graph moves toward its target along an
//! exponential curve instead of jumping, which keeps gain changes click-free.

/// An exponentially smoothed control value.
#[derive(Debug, Clone)]
pub struct SmoothedParam {
    current: f32,
    target: f32,
    /// Per-sample approach coefficient, `exp(-1 / (tau * sample_rate))`.
    pole: f32,
    sample_rate: f64,
}

impl SmoothedParam {
    pub fn new(value: f32, time_constant: f64, sample_rate: f64) -> Self {
        let mut p = SmoothedParam {
            current: value,
            target: value,
            pole: 0.0,
            sample_rate,
        };
        p.set_time_constant(time_constant);
        p
    }

    /// Change the time constant (seconds). Zero or negative jumps instantly.
    pub fn set_time_constant(&mut self, time_constant: f64) {
        self.pole = if time_constant > 0.0 {
            (-1.0 / (time_constant * self.sample_rate)).exp() as f32
        } else {
            0.0
        };
    }

    /// Move toward `target` with the current time constant.
    pub fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    /// Jump to `value` immediately.
    pub fn set_immediate(&mut self, value: f32) {
        self.current = value;
        self.target = value;
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn is_settled(&self) -> bool {
        (self.current - self.target).abs() < 1e-6
    }

    /// Advance one sample and return the new value.
    #[inline]
    pub fn next(&mut self) -> f32 {
        if self.current != self.target {
            self.current = self.target + (self.current - self.target) * self.pole;
            if self.is_settled() {
                self.current = self.target;
            }
        }
        self.current
    }

    /// Advance `frames` samples at once and return the value at the end.
    pub fn advance(&mut self, frames: usize) -> f32 {
        if self.current != self.target {
            let decay = self.pole.powi(frames as i32);
            self.current = self.target + (self.current - self.target) * decay;
            if self.is_settled() {
                self.current = self.target;
            }
        }
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reaches_63_percent_after_one_time_constant() {
        let mut p = SmoothedParam::new(0.0, 0.01, 1000.0);
        p.set_target(1.0);
        let mut v = 0.0;
        for _ in 0..10 {
            v = p.next();
        }
        assert!((v - 0.632).abs() < 0.01, "expected ~0.632, got {v}");
    }

    #[test]
    fn block_advance_matches_per_sample() {
        let mut a = SmoothedParam::new(1.0, 0.02, 8000.0);
        let mut b = a.clone();
        a.set_target(-3.0);
        b.set_target(-3.0);
        let mut last = 0.0;
        for _ in 0..64 {
            last = a.next();
        }
        let block = b.advance(64);
        assert!((last - block).abs() < 1e-4);
    }

    #[test]
    fn immediate_and_settling() {
        let mut p = SmoothedParam::new(0.5, 0.01, 44100.0);
        p.set_immediate(0.8);
        assert_eq!(p.current(), 0.8);
        assert!(p.is_settled());
        p.set_target(0.0);
        p.advance(44100);
        assert_eq!(p.current(), 0.0);
    }

    #[test]
    fn zero_time_constant_jumps() {
        let mut p = SmoothedParam::new(0.0, 0.0, 44100.0);
        p.set_target(1.0);
        assert_eq!(p.next(), 1.0);
    }
}
