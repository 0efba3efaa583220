//! Property tests for parameter clamping and EQ matching.

use proptest::prelude::*;
use tonematch_core::config::{MAX_GAIN_DB, MIN_GAIN_DB};
use tonematch_core::{BandPreset, EngineConfig, FilterGraph, compute_match};

fn graph() -> FilterGraph {
    FilterGraph::new(&EngineConfig {
        sample_rate: 8000.0,
        bands: BandPreset::Custom(vec![100.0, 1000.0, 3000.0]),
        echo_enabled: false,
        ..EngineConfig::default()
    })
    .unwrap()
}

fn profile(len: std::ops::Range<usize>) -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-200.0f32..20.0, len)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn band_gain_readback_is_clamped(index in 0usize..3, db in -1.0e4f32..1.0e4) {
        let mut g = graph();
        g.set_band_gain(index, db);
        prop_assert_eq!(g.band_gain(index), Some(db.clamp(MIN_GAIN_DB, MAX_GAIN_DB)));
    }

    #[test]
    fn levels_never_leave_their_range(
        dry in -10.0f32..10.0,
        wet in -10.0f32..10.0,
        vol in -10.0f32..10.0,
    ) {
        let mut g = graph();
        g.set_reverb_dry(dry);
        g.set_reverb_wet(wet);
        g.set_master_volume(vol);
        prop_assert!((0.0..=1.0).contains(&g.reverb_dry()));
        prop_assert!((0.0..=1.0).contains(&g.reverb_wet()));
        prop_assert!(g.master_volume() >= 0.0);
    }
}

proptest! {
    #[test]
    fn match_gains_are_bounded(source in profile(1..40), target in profile(1..40)) {
        let gains = compute_match(&source, &target);
        prop_assert_eq!(gains.len(), source.len().max(target.len()));
        for g in gains {
            prop_assert!((MIN_GAIN_DB..=MAX_GAIN_DB).contains(&g), "gain {} out of range", g);
        }
    }

    #[test]
    fn self_match_is_flat(p in profile(1..40)) {
        prop_assert!(compute_match(&p, &p).iter().all(|g| *g == 0.0));
    }

    #[test]
    fn unclamped_match_is_mean_centered(
        source in prop::collection::vec(-40.0f32..-30.0, 2..20),
        shift in -20.0f32..20.0,
    ) {
        // Deltas lie within 10 dB of each other, so nothing hits the clamp.
        let target: Vec<f32> = source
            .iter()
            .enumerate()
            .map(|(i, s)| s + shift + (i % 3) as f32)
            .collect();
        let gains = compute_match(&source, &target);
        let sum: f32 = gains.iter().sum();
        prop_assert!(sum.abs() < 1e-3, "sum {}", sum);
    }
}
