//! Spectral estimator — per-band magnitude profile of one buffer.
//!
//! Instead of a full transform, each band center is evaluated with a
//! single-frequency partial DFT over a decimated window, at a handful of
//! offsets spread across the first 30 seconds. The result is a coarse but
//! cheap picture of tonal balance, which is all the matcher needs.

use std::f64::consts::TAU;

use super::schedule::Scheduler;
use crate::buffer::AudioBuffer;
use crate::config::{AnalysisConfig, BandConfig, DB_EPSILON};

/// Per-band level in dB, ordered like the [`BandConfig`].
pub type SpectrumProfile = Vec<f32>;

/// Level reported for a band with no energy.
pub fn silence_floor_db() -> f32 {
    (20.0 * DB_EPSILON.log10()) as f32
}

#[derive(Debug, Clone)]
pub struct SpectralEstimator {
    bands: BandConfig,
    analysis: AnalysisConfig,
}

impl SpectralEstimator {
    pub fn new(bands: BandConfig, analysis: AnalysisConfig) -> Self {
        SpectralEstimator { bands, analysis }
    }

    pub fn bands(&self) -> &BandConfig {
        &self.bands
    }

    pub fn analysis(&self) -> &AnalysisConfig {
        &self.analysis
    }

    /// Estimate the profile of `buffer`, yielding to `scheduler` after every
    /// sampled offset (and every few bands when so configured).
    ///
    /// Never fails: an empty buffer gives the silence floor on every band,
    /// and buffers shorter than one window are analysed as a single window.
    pub async fn estimate<S: Scheduler>(
        &self,
        buffer: &AudioBuffer,
        scheduler: &S,
    ) -> SpectrumProfile {
        let freqs = self.bands.frequencies();
        let sample_rate = buffer.sample_rate();
        let max_frames = (self.analysis.max_seconds * sample_rate) as usize;
        let span = buffer.frames().min(max_frames);

        if span == 0 {
            log::debug!("spectrum: empty buffer, reporting the silence floor");
            scheduler.yield_now().await;
            return vec![silence_floor_db(); freqs.len()];
        }

        let (window, offsets) = if span < self.analysis.window {
            (span, 1)
        } else {
            (self.analysis.window, self.analysis.samples.max(1))
        };
        let stride = self.analysis.stride.clamp(1, window);
        let taps = window.div_ceil(stride) as f64;
        log::debug!(
            "spectrum: {} bands, {offsets} offsets, window {window}, stride {stride}",
            freqs.len()
        );

        let mut sums = vec![0.0_f64; freqs.len()];
        for k in 0..offsets {
            let start = if offsets > 1 {
                (span - window) * k / (offsets - 1)
            } else {
                0
            };

            for (band, &freq) in freqs.iter().enumerate() {
                let omega = TAU * freq as f64 / sample_rate;
                let (mut re, mut im) = (0.0_f64, 0.0_f64);
                for n in (0..window).step_by(stride) {
                    let x = buffer.mono_frame(start + n) as f64;
                    let phase = omega * n as f64;
                    re += x * phase.cos();
                    im += x * phase.sin();
                }
                let magnitude = (re * re + im * im).sqrt() / taps;
                sums[band] += 20.0 * (magnitude + DB_EPSILON).log10();

                let yield_here = self
                    .analysis
                    .yield_every_bands
                    .is_some_and(|every| every > 0 && (band + 1) % every == 0);
                if yield_here {
                    scheduler.yield_now().await;
                }
            }

            scheduler.yield_now().await;
        }

        sums.into_iter()
            .map(|sum| (sum / offsets as f64) as f32)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::schedule::YieldNow;
    use crate::config::DeviceClass;
    use std::cell::Cell;
    use std::future::Future;
    use std::time::Duration;

    #[derive(Default)]
    struct Counting {
        yields: Cell<usize>,
    }

    impl Scheduler for Counting {
        fn yield_now(&self) -> impl Future<Output = ()> {
            self.yields.set(self.yields.get() + 1);
            YieldNow::default()
        }

        fn sleep(&self, _: Duration) -> impl Future<Output = ()> {
            std::future::ready(())
        }
    }

    fn desktop() -> SpectralEstimator {
        SpectralEstimator::new(BandConfig::ten_band(), DeviceClass::Desktop.analysis())
    }

    #[tokio::test]
    async fn sine_at_band_center_dominates() {
        let buf = AudioBuffer::sine(1000.0, 2.0, 44_100.0);
        let profile = desktop().estimate(&buf, &Counting::default()).await;
        assert_eq!(profile.len(), 10);

        let center = profile[5];
        // amplitude 0.5 → partial-DFT magnitude 0.25 → about -12 dB
        assert!((center - (-12.04)).abs() < 1.0, "1 kHz band at {center} dB");
        for (i, db) in profile.iter().enumerate().filter(|(i, _)| *i != 5) {
            assert!(center - db > 20.0, "band {i} at {db} dB too close to {center} dB");
        }
    }

    #[tokio::test]
    async fn yields_once_per_offset_on_desktop() {
        let s = Counting::default();
        desktop().estimate(&AudioBuffer::sine(440.0, 1.0, 44_100.0), &s).await;
        assert_eq!(s.yields.get(), 16);
    }

    #[tokio::test]
    async fn mobile_also_yields_every_few_bands() {
        let s = Counting::default();
        let est = SpectralEstimator::new(BandConfig::ten_band(), DeviceClass::Mobile.analysis());
        est.estimate(&AudioBuffer::sine(440.0, 1.0, 44_100.0), &s).await;
        // 6 offsets × (2 band yields + 1 offset yield)
        assert_eq!(s.yields.get(), 18);
    }

    #[tokio::test]
    async fn empty_and_silent_buffers_hit_the_floor() {
        let floor = silence_floor_db();
        assert!((floor + 200.0).abs() < 1e-3);

        let empty = AudioBuffer::mono(vec![], 44_100.0).unwrap();
        let profile = desktop().estimate(&empty, &Counting::default()).await;
        assert_eq!(profile, vec![floor; 10]);

        let silent = AudioBuffer::mono(vec![0.0; 10_000], 44_100.0).unwrap();
        let profile = desktop().estimate(&silent, &Counting::default()).await;
        assert!(profile.iter().all(|db| (db - floor).abs() < 1e-3));
    }

    #[tokio::test]
    async fn short_buffer_uses_one_shrunken_window() {
        let s = Counting::default();
        let short = AudioBuffer::sine(1000.0, 0.01, 44_100.0);
        let profile = desktop().estimate(&short, &s).await;
        assert_eq!(s.yields.get(), 1);
        assert!(profile.iter().all(|db| db.is_finite()));
    }
}
