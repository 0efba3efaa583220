//! Reverb effect — convolution with a synthetic impulse response.
//!
//! The impulse response is seeded noise under an exponential decay envelope,
//! generated once per graph. Convolution uses uniformly partitioned
//! overlap-add in the frequency domain, so the cost per sample depends on
//! the partition size rather than the impulse length. The wet path carries
//! one partition of latency.

use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

/// Partition length in frames (and the wet path's latency).
const PARTITION: usize = 512;

/// Generate one channel of exponentially decaying noise, normalised to unit
/// energy so the wet path sits at roughly the dry level.
pub fn synthetic_impulse(sample_rate: f64, seconds: f64, decay: f64, seed: u64) -> Vec<f32> {
    let len = ((sample_rate * seconds) as usize).max(1);
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut ir: Vec<f32> = (0..len)
        .map(|i| {
            let t = i as f64 / len as f64;
            let envelope = (-decay * t).exp();
            (rng.gen_range(-1.0..1.0) * envelope) as f32
        })
        .collect();

    let energy: f32 = ir.iter().map(|s| s * s).sum::<f32>().sqrt();
    if energy > 0.0 {
        for s in &mut ir {
            *s /= energy;
        }
    }
    ir
}

/// Single-channel uniformly partitioned convolver.
struct PartitionedConvolver {
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    /// Spectrum of each impulse partition, zero-padded to `2 * PARTITION`.
    ir_spectra: Vec<Vec<Complex<f32>>>,
    /// Spectra of the most recent input blocks (frequency-domain delay line).
    history: Vec<Vec<Complex<f32>>>,
    head: usize,

    input: Vec<f32>,
    output: Vec<f32>,
    overlap: Vec<f32>,
    pos: usize,

    accum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl PartitionedConvolver {
    fn new(ir: &[f32], planner: &mut FftPlanner<f32>) -> Self {
        let n = PARTITION * 2;
        let fft = planner.plan_fft_forward(n);
        let ifft = planner.plan_fft_inverse(n);
        let scratch_len = fft
            .get_inplace_scratch_len()
            .max(ifft.get_inplace_scratch_len());
        let mut scratch = vec![Complex::default(); scratch_len];

        let ir = if ir.is_empty() { &[0.0][..] } else { ir };
        let ir_spectra: Vec<Vec<Complex<f32>>> = ir
            .chunks(PARTITION)
            .map(|part| {
                let mut spectrum = vec![Complex::default(); n];
                for (dst, &s) in spectrum.iter_mut().zip(part) {
                    dst.re = s;
                }
                fft.process_with_scratch(&mut spectrum, &mut scratch);
                spectrum
            })
            .collect();
        let partitions = ir_spectra.len();

        PartitionedConvolver {
            fft,
            ifft,
            ir_spectra,
            history: vec![vec![Complex::default(); n]; partitions],
            head: 0,
            input: vec![0.0; PARTITION],
            output: vec![0.0; PARTITION],
            overlap: vec![0.0; PARTITION],
            pos: 0,
            accum: vec![Complex::default(); n],
            scratch,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let out = self.output[self.pos];
        self.input[self.pos] = input;
        self.pos += 1;
        if self.pos == PARTITION {
            self.flush_block();
            self.pos = 0;
        }
        out
    }

    fn flush_block(&mut self) {
        let n = PARTITION * 2;
        let partitions = self.ir_spectra.len();

        // Transform the newest input block into the delay line.
        let slot = &mut self.history[self.head];
        for (i, c) in slot.iter_mut().enumerate() {
            *c = Complex::new(if i < PARTITION { self.input[i] } else { 0.0 }, 0.0);
        }
        self.fft.process_with_scratch(slot, &mut self.scratch);

        // Multiply-accumulate every partition against its input block.
        self.accum.fill(Complex::default());
        for (p, h) in self.ir_spectra.iter().enumerate() {
            let x = &self.history[(self.head + partitions - p) % partitions];
            for ((acc, xv), hv) in self.accum.iter_mut().zip(x).zip(h) {
                *acc += xv * hv;
            }
        }
        self.head = (self.head + 1) % partitions;

        self.ifft.process_with_scratch(&mut self.accum, &mut self.scratch);
        let scale = 1.0 / n as f32;
        for i in 0..PARTITION {
            self.output[i] = self.accum[i].re * scale + self.overlap[i];
            self.overlap[i] = self.accum[PARTITION + i].re * scale;
        }
    }

    fn clear(&mut self) {
        for h in &mut self.history {
            h.fill(Complex::default());
        }
        self.input.fill(0.0);
        self.output.fill(0.0);
        self.overlap.fill(0.0);
        self.pos = 0;
        self.head = 0;
    }
}

/// A stereo convolution reverb returning the fully wet signal. Dry/wet
/// balance belongs to the surrounding graph.
pub struct ConvolutionReverb {
    left: PartitionedConvolver,
    right: PartitionedConvolver,
    ir_len: usize,
}

impl ConvolutionReverb {
    /// Build a reverb with a synthetic impulse (one noise stream per channel).
    pub fn new(sample_rate: f64, seconds: f64, decay: f64, seed: u64) -> Self {
        let ir_l = synthetic_impulse(sample_rate, seconds, decay, seed);
        let ir_r = synthetic_impulse(sample_rate, seconds, decay, seed.wrapping_add(1));
        Self::with_impulse(&ir_l, &ir_r)
    }

    /// Build a reverb from explicit left/right impulse responses.
    pub fn with_impulse(ir_l: &[f32], ir_r: &[f32]) -> Self {
        let mut planner = FftPlanner::new();
        ConvolutionReverb {
            left: PartitionedConvolver::new(ir_l, &mut planner),
            right: PartitionedConvolver::new(ir_r, &mut planner),
            ir_len: ir_l.len().max(ir_r.len()),
        }
    }

    /// Wet path latency in frames.
    pub fn latency(&self) -> usize {
        PARTITION
    }

    pub fn impulse_len(&self) -> usize {
        self.ir_len
    }

    /// Process a stereo sample pair, returning the wet output.
    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        (self.left.process(left), self.right.process(right))
    }

    /// Clear all internal buffers.
    pub fn clear(&mut self) {
        self.left.clear();
        self.right.clear();
    }
}

impl std::fmt::Debug for ConvolutionReverb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvolutionReverb")
            .field("ir_len", &self.ir_len)
            .field("latency", &PARTITION)
            .finish()
    }
}
