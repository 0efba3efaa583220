//! Visualizer tap — a short-time magnitude snapshot of the graph output.
//!
//! Mirrors the WebAudio `AnalyserNode::getByteFrequencyData` contract:
//! Blackman window, FFT, per-bin exponential smoothing over successive
//! snapshots, then dB mapped linearly from `[-100, -30]` onto `[0, 255]`.
//! For UI display only; the EQ matcher never reads it.

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

const MIN_DB: f32 = -100.0;
const MAX_DB: f32 = -30.0;
const SMOOTHING: f32 = 0.8;

pub struct Analyser {
    fft: Arc<dyn Fft<f32>>,
    /// Ring of the most recent mono output samples.
    ring: Vec<f32>,
    write_pos: usize,
    window: Vec<f32>,
    smoothed: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl Analyser {
    pub fn new(fft_size: usize) -> Self {
        let fft_size = fft_size.max(2);
        let fft = FftPlanner::new().plan_fft_forward(fft_size);
        let scratch = vec![Complex::default(); fft.get_inplace_scratch_len()];
        let window = (0..fft_size)
            .map(|i| {
                let x = i as f32 / fft_size as f32;
                let tau = std::f32::consts::TAU;
                0.42 - 0.5 * (tau * x).cos() + 0.08 * (2.0 * tau * x).cos()
            })
            .collect();
        Analyser {
            fft,
            ring: vec![0.0; fft_size],
            write_pos: 0,
            window,
            smoothed: vec![0.0; fft_size / 2],
            spectrum: vec![Complex::default(); fft_size],
            scratch,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.ring.len()
    }

    pub fn bin_count(&self) -> usize {
        self.smoothed.len()
    }

    /// Feed a rendered stereo block.
    pub fn push_block(&mut self, left: &[f32], right: &[f32]) {
        let len = self.ring.len();
        for (l, r) in left.iter().zip(right) {
            self.ring[self.write_pos] = 0.5 * (l + r);
            self.write_pos = (self.write_pos + 1) % len;
        }
    }

    /// Take a byte-scaled magnitude snapshot, one byte per bin.
    pub fn byte_frequency_data(&mut self) -> Vec<u8> {
        let n = self.ring.len();
        for i in 0..n {
            let sample = self.ring[(self.write_pos + i) % n];
            self.spectrum[i] = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);

        let scale = 1.0 / n as f32;
        self.smoothed
            .iter_mut()
            .zip(&self.spectrum)
            .map(|(prev, bin)| {
                let magnitude = bin.norm() * scale;
                *prev = SMOOTHING * *prev + (1.0 - SMOOTHING) * magnitude;
                let db = 20.0 * prev.max(f32::MIN_POSITIVE).log10();
                let scaled = 255.0 * (db - MIN_DB) / (MAX_DB - MIN_DB);
                scaled.clamp(0.0, 255.0) as u8
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.ring.fill(0.0);
        self.smoothed.fill(0.0);
        self.write_pos = 0;
    }
}

impl std::fmt::Debug for Analyser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyser")
            .field("fft_size", &self.ring.len())
            .finish()
    }
}
