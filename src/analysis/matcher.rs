//! EQ matcher — band gains that move one profile's tonal balance to another's.

use serde::{Deserialize, Serialize};

use super::schedule::Scheduler;
use super::spectrum::{SpectralEstimator, SpectrumProfile};
use crate::buffer::AudioBuffer;
use crate::config::{DeviceClass, clamp_gain_db};

/// Per-band gain in dB, mean-centered and clamped to ±12.
pub type MatchResult = Vec<f32>;

/// Gains that reshape `source` toward `target` without changing loudness.
///
/// `delta[i] = target[i] - source[i]`, minus the mean delta, clamped to
/// ±12 dB. A non-finite delta (or a band missing from the shorter profile)
/// contributes 0 to both its own entry and the mean.
pub fn compute_match(source: &[f32], target: &[f32]) -> MatchResult {
    let bands = source.len().max(target.len());
    if bands == 0 {
        return Vec::new();
    }

    let deltas: Vec<f64> = (0..bands)
        .map(|i| match (source.get(i), target.get(i)) {
            (Some(&s), Some(&t)) => {
                let d = t as f64 - s as f64;
                if d.is_finite() { d } else { 0.0 }
            }
            _ => 0.0,
        })
        .collect();
    let mean = deltas.iter().sum::<f64>() / bands as f64;

    deltas
        .into_iter()
        .map(|d| clamp_gain_db((d - mean) as f32))
        .collect()
}

/// Both profiles and the gains derived from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOutcome {
    pub source: SpectrumProfile,
    pub target: SpectrumProfile,
    pub gains: MatchResult,
}

/// Estimate `source`, cool down, estimate `target`, then match.
///
/// The two estimations never overlap; the pause between them is the
/// device's cooldown.
pub async fn match_sources<S: Scheduler>(
    estimator: &SpectralEstimator,
    device: DeviceClass,
    source: &AudioBuffer,
    target: &AudioBuffer,
    scheduler: &S,
) -> MatchOutcome {
    let source_profile = estimator.estimate(source, scheduler).await;
    scheduler.sleep(device.cooldown()).await;
    let target_profile = estimator.estimate(target, scheduler).await;
    let gains = compute_match(&source_profile, &target_profile);
    log::info!("eq match: {gains:?}");
    MatchOutcome {
        source: source_profile,
        target: target_profile,
        gains,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::schedule::InlineScheduler;
    use crate::config::BandConfig;

    #[test]
    fn three_band_scenario() {
        let a = [-10.0, -10.0, -10.0];
        let b = [-10.0, -10.0, 2.0];
        assert_eq!(compute_match(&a, &b), vec![-4.0, -4.0, 8.0]);
    }

    #[test]
    fn identical_profiles_match_to_zero() {
        let p = [-3.5, -20.0, 0.0, 7.25];
        assert!(compute_match(&p, &p).iter().all(|g| *g == 0.0));
    }

    #[test]
    fn results_are_clamped() {
        let a = [0.0, 0.0, 0.0, 0.0];
        let b = [60.0, -60.0, 0.0, 0.0];
        assert_eq!(compute_match(&a, &b), vec![12.0, -12.0, 0.0, 0.0]);
    }

    #[test]
    fn non_finite_deltas_count_as_zero() {
        let a = [f32::NEG_INFINITY, 0.0, 0.0];
        let b = [0.0, 3.0, f32::NAN];
        // deltas [0, 3, 0], mean 1
        assert_eq!(compute_match(&a, &b), vec![-1.0, 2.0, -1.0]);
    }

    #[test]
    fn mismatched_lengths_pad_with_zero() {
        assert_eq!(compute_match(&[0.0, 0.0], &[4.0]), vec![2.0, -2.0]);
        assert!(compute_match(&[], &[]).is_empty());
    }

    #[tokio::test]
    async fn matching_a_buffer_to_itself_is_flat() {
        let est = SpectralEstimator::new(BandConfig::ten_band(), DeviceClass::Desktop.analysis());
        let buf = AudioBuffer::sine(500.0, 1.0, 44_100.0);
        let outcome = match_sources(&est, DeviceClass::Desktop, &buf, &buf, &InlineScheduler).await;
        assert_eq!(outcome.source, outcome.target);
        assert!(outcome.gains.iter().all(|g| g.abs() < 1e-4));
    }
}
