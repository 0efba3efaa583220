//! Peaking biquad — matches WebAudio BiquadFilterNode "peaking" coefficients.

use std::f64::consts::PI;

/// A stereo peaking EQ band (2nd order IIR).
///
/// Implements the standard Direct Form II Transposed structure, one state
/// pair per channel sharing one coefficient set.
/// Coefficient formulas from the Audio EQ Cookbook (Robert Bristow-Johnson).
#[derive(Debug, Clone)]
pub struct PeakingFilter {
    pub frequency: f64,
    pub q: f64,
    gain_db: f64,

    // Coefficients
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    // State (Direct Form II Transposed), [left, right]
    z1: [f64; 2],
    z2: [f64; 2],

    sample_rate: f64,
}

impl PeakingFilter {
    pub fn new(frequency: f64, q: f64, sample_rate: f64) -> Self {
        let mut f = PeakingFilter {
            frequency,
            q,
            gain_db: 0.0,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: [0.0; 2],
            z2: [0.0; 2],
            sample_rate,
        };
        f.update_coefficients();
        f
    }

    pub fn gain_db(&self) -> f64 {
        self.gain_db
    }

    /// Set the gain and recompute coefficients if it actually moved.
    pub fn set_gain_db(&mut self, gain_db: f64) {
        if (gain_db - self.gain_db).abs() > 1e-6 {
            self.gain_db = gain_db;
            self.update_coefficients();
        }
    }

    /// Recompute filter coefficients from current parameters.
    pub fn update_coefficients(&mut self) {
        let w0 = 2.0 * PI * self.frequency / self.sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * self.q);
        let a_lin = 10.0_f64.powf(self.gain_db / 40.0);

        let b0 = 1.0 + alpha * a_lin;
        let b1 = -2.0 * cos_w0;
        let b2 = 1.0 - alpha * a_lin;
        let a0 = 1.0 + alpha / a_lin;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha / a_lin;

        // Normalize by a0
        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
    }

    #[inline]
    fn tick(&mut self, ch: usize, input: f64) -> f64 {
        let output = self.b0 * input + self.z1[ch];
        self.z1[ch] = self.b1 * input - self.a1 * output + self.z2[ch];
        self.z2[ch] = self.b2 * input - self.a2 * output;
        output
    }

    /// Process a stereo sample pair.
    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        (
            self.tick(0, left as f64) as f32,
            self.tick(1, right as f64) as f32,
        )
    }

    /// Process a block of stereo audio in-place.
    pub fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let (out_l, out_r) = self.process(*l, *r);
            *l = out_l;
            *r = out_r;
        }
    }

    /// Reset filter state.
    pub fn reset(&mut self) {
        self.z1 = [0.0; 2];
        self.z2 = [0.0; 2];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_amplitude(filter: &mut PeakingFilter, freq: f64, sample_rate: f64) -> f32 {
        let mut max_out = 0.0_f32;
        for i in 0..(sample_rate as usize) {
            let t = i as f64 / sample_rate;
            let input = (2.0 * PI * freq * t).sin() as f32;
            let (out, _) = filter.process(input, input);
            if i > sample_rate as usize / 2 {
                // skip transient
                max_out = max_out.max(out.abs());
            }
        }
        max_out
    }

    #[test]
    fn flat_gain_is_transparent() {
        let mut f = PeakingFilter::new(1000.0, 1.4, 44100.0);
        for i in 0..1000 {
            let input = ((i % 37) as f32 / 37.0) - 0.5;
            let (l, r) = f.process(input, -input);
            assert!((l - input).abs() < 1e-5, "0 dB band changed sample {i}");
            assert!((r + input).abs() < 1e-5);
        }
    }

    #[test]
    fn boost_at_center_matches_gain() {
        let mut f = PeakingFilter::new(1000.0, 1.4, 44100.0);
        f.set_gain_db(12.0);
        let amp = sine_amplitude(&mut f, 1000.0, 44100.0);
        let expected = 10.0_f32.powf(12.0 / 20.0);
        assert!(
            (amp - expected).abs() < 0.05 * expected,
            "+12 dB at center should give ~{expected}, got {amp}"
        );
    }

    #[test]
    fn cut_leaves_distant_frequencies_alone() {
        let mut f = PeakingFilter::new(100.0, 1.4, 44100.0);
        f.set_gain_db(-12.0);
        let amp = sine_amplitude(&mut f, 8000.0, 44100.0);
        assert!((amp - 1.0).abs() < 0.02, "8 kHz should pass a 100 Hz cut, got {amp}");
    }

    #[test]
    fn filter_output_finite() {
        let mut f = PeakingFilter::new(16000.0, 1.4, 44100.0);
        f.set_gain_db(12.0);
        for i in 0..10000 {
            let input = if i % 100 == 0 { 1.0 } else { 0.0 };
            let (out, _) = f.process(input, input);
            assert!(out.is_finite(), "Filter output not finite at sample {i}");
        }
    }
}
