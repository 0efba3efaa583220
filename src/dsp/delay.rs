//! Echo effect — stereo delay line with feedback and separate dry/wet gains.

use super::param::SmoothedParam;
use crate::config::{MAX_ECHO_DELAY, MAX_ECHO_FEEDBACK, SMOOTHING_SECONDS, clamp_level};

/// A stereo echo with configurable time, feedback, and dry/wet gains.
///
/// The delay buffer holds up to [`MAX_ECHO_DELAY`] seconds of audio. Every
/// control is smoothed, so moving the delay time glides instead of clicking.
#[derive(Debug, Clone)]
pub struct Echo {
    buffer_l: Vec<f32>,
    buffer_r: Vec<f32>,
    write_pos: usize,
    sample_rate: f64,

    delay_time: SmoothedParam,
    feedback: SmoothedParam,
    dry: SmoothedParam,
    wet: SmoothedParam,
}

impl Echo {
    /// Create a new echo stage. Defaults: 0.3 s delay, 0.3 feedback, fully
    /// dry (the echo is inaudible until the wet gain is raised).
    pub fn new(sample_rate: f64) -> Self {
        let buffer_size = (sample_rate * MAX_ECHO_DELAY) as usize + 2;
        let param = |v: f32| SmoothedParam::new(v, SMOOTHING_SECONDS, sample_rate);
        Self {
            buffer_l: vec![0.0; buffer_size],
            buffer_r: vec![0.0; buffer_size],
            write_pos: 0,
            sample_rate,
            delay_time: param(0.3),
            feedback: param(0.3),
            dry: param(1.0),
            wet: param(0.0),
        }
    }

    /// Delay time in seconds, clamped to `[0, 5]`.
    pub fn set_delay_time(&mut self, seconds: f64) {
        let seconds = if seconds.is_nan() { 0.0 } else { seconds.clamp(0.0, MAX_ECHO_DELAY) };
        self.delay_time.set_target(seconds as f32);
    }

    /// Feedback gain, clamped to `[0, 0.99]`.
    pub fn set_feedback(&mut self, gain: f32) {
        self.feedback.set_target(clamp_level(gain, MAX_ECHO_FEEDBACK));
    }

    pub fn set_dry(&mut self, level: f32) {
        self.dry.set_target(clamp_level(level, 1.0));
    }

    pub fn set_wet(&mut self, level: f32) {
        self.wet.set_target(clamp_level(level, 1.0));
    }

    pub fn delay_time(&self) -> f64 {
        self.delay_time.target() as f64
    }

    pub fn feedback(&self) -> f32 {
        self.feedback.target()
    }

    pub fn dry(&self) -> f32 {
        self.dry.target()
    }

    pub fn wet(&self) -> f32 {
        self.wet.target()
    }

    /// Jump every control to its target.
    #[cfg(test)]
    pub fn settle(&mut self) {
        for p in [&mut self.delay_time, &mut self.feedback, &mut self.dry, &mut self.wet] {
            let t = p.target();
            p.set_immediate(t);
        }
    }

    /// Process a stereo sample pair, returning the processed output.
    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let buffer_len = self.buffer_l.len();
        let delay_samples = (self.delay_time.next() as f64 * self.sample_rate).round() as usize;
        let delay_samples = delay_samples.clamp(1, buffer_len - 1);
        let feedback = self.feedback.next();
        let dry = self.dry.next();
        let wet = self.wet.next();

        // Calculate read position
        let read_pos = if self.write_pos >= delay_samples {
            self.write_pos - delay_samples
        } else {
            buffer_len - (delay_samples - self.write_pos)
        };

        // Read delayed samples
        let delayed_l = self.buffer_l[read_pos];
        let delayed_r = self.buffer_r[read_pos];

        // Write input + feedback to buffer
        self.buffer_l[self.write_pos] = left + delayed_l * feedback;
        self.buffer_r[self.write_pos] = right + delayed_r * feedback;

        // Advance write position
        self.write_pos = (self.write_pos + 1) % buffer_len;

        (left * dry + delayed_l * wet, right * dry + delayed_r * wet)
    }

    /// Clear the delay buffers.
    pub fn clear(&mut self) {
        self.buffer_l.fill(0.0);
        self.buffer_r.fill(0.0);
        self.write_pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settled(sample_rate: f64, delay: f64, feedback: f32, dry: f32, wet: f32) -> Echo {
        let mut echo = Echo::new(sample_rate);
        echo.set_delay_time(delay);
        echo.set_feedback(feedback);
        echo.set_dry(dry);
        echo.set_wet(wet);
        echo.settle();
        echo
    }

    #[test]
    fn passthrough_when_dry() {
        let mut echo = settled(44100.0, 0.5, 0.0, 1.0, 0.0);
        let (out_l, out_r) = echo.process(0.5, -0.5);
        assert!((out_l - 0.5).abs() < 1e-6);
        assert!((out_r - (-0.5)).abs() < 1e-6);
    }

    #[test]
    fn outputs_delayed_signal() {
        let sample_rate = 44100.0;
        let delay_time = 0.01; // 10ms = 441 samples
        let mut echo = settled(sample_rate, delay_time, 0.0, 0.0, 1.0);

        // Send an impulse
        echo.process(1.0, 1.0);

        let delay_samples = (delay_time * sample_rate).round() as usize;
        for _ in 1..delay_samples {
            let (out_l, _) = echo.process(0.0, 0.0);
            assert!(out_l.abs() < 1e-6);
        }

        // At delay time, the impulse should appear
        let (out_l, out_r) = echo.process(0.0, 0.0);
        assert!((out_l - 1.0).abs() < 1e-6);
        assert!((out_r - 1.0).abs() < 1e-6);
    }

    #[test]
    fn feedback_attenuates_repeats() {
        let sample_rate = 1000.0;
        let delay_time = 0.01; // 10 samples
        let mut echo = settled(sample_rate, delay_time, 0.5, 0.0, 1.0);

        echo.process(1.0, 1.0);
        let delay_samples = (delay_time * sample_rate).round() as usize;
        for _ in 1..delay_samples {
            echo.process(0.0, 0.0);
        }
        let (first_echo, _) = echo.process(0.0, 0.0);
        assert!((first_echo - 1.0).abs() < 1e-6);

        for _ in 1..delay_samples {
            echo.process(0.0, 0.0);
        }
        let (second_echo, _) = echo.process(0.0, 0.0);
        assert!((second_echo - 0.5).abs() < 1e-6);
    }

    #[test]
    fn controls_are_clamped() {
        let mut echo = Echo::new(8000.0);
        echo.set_delay_time(60.0);
        echo.set_feedback(3.0);
        echo.set_dry(-1.0);
        echo.set_wet(f32::NAN);
        assert_eq!(echo.delay_time(), MAX_ECHO_DELAY);
        assert_eq!(echo.feedback(), MAX_ECHO_FEEDBACK);
        assert_eq!(echo.dry(), 0.0);
        assert_eq!(echo.wet(), 0.0);
    }
}
