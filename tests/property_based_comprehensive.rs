//! Property-based tests for the detection and flattening pipeline
//!
//! Designed to run in a few seconds as a pre-commit quality gate.
//!
//! Core properties tested:
//! 1. Smoothing preserves length and stays within the input range
//! 2. CUSUM is clipped at zero and never deepens as k grows
//! 3. Minimum location resolves ties to the first index
//! 4. Decisions are pure and the threshold comparison is monotone
//! 5. Flattening touches only the prefix and stays inside the noise band

use pcr_flatten::detection::{
    cusum, decide, locate_minimum, smooth, CriterionKind, DetectionConfig, FlattenDecision,
};
use pcr_flatten::flattener::Flattener;
use pcr_flatten::Series;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn readings(max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-1000.0f64..5000.0, 1..max_len)
}

fn odd_window() -> impl Strategy<Value = usize> {
    (0usize..6).prop_map(|h| 2 * h + 1)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_smoothing_preserves_length_and_range(values in readings(80), window in odd_window()) {
        let smoothed = smooth(&values, window).unwrap();
        prop_assert_eq!(smoothed.len(), values.len());

        let lo = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let hi = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        for s in smoothed {
            prop_assert!(s >= lo - 1e-6 && s <= hi + 1e-6);
        }
    }

    #[test]
    fn prop_cusum_never_positive(values in readings(80), k in 0.0f64..10.0) {
        let stat = cusum(&values, k).unwrap();
        prop_assert_eq!(stat.len(), values.len());
        prop_assert_eq!(stat[0], 0.0);
        prop_assert!(stat.iter().all(|&c| c <= 0.0));
    }

    #[test]
    fn prop_larger_k_never_deepens(values in readings(80), k in 0.0f64..5.0, extra in 0.0f64..5.0) {
        let loose = cusum(&values, k).unwrap();
        let tight = cusum(&values, k + extra).unwrap();
        for (a, b) in loose.iter().zip(&tight) {
            prop_assert!(b >= a);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_minimum_is_first_occurrence(values in prop::collection::vec(-5i32..5, 1..50)) {
        // Small integer range forces plenty of ties
        let values: Vec<f64> = values.into_iter().map(f64::from).collect();
        let min = locate_minimum(&values).unwrap();

        prop_assert!(values.iter().all(|&v| v >= min.value));
        prop_assert!(values[..min.index].iter().all(|&v| v > min.value));
        prop_assert_eq!(values[min.index], min.value);
    }

    #[test]
    fn prop_decide_is_pure(values in readings(60), window in odd_window()) {
        let series = Series::new(values);
        let config = DetectionConfig::default().with_window(window);
        prop_assert_eq!(decide(&series, &config).unwrap(), decide(&series, &config).unwrap());
    }

    #[test]
    fn prop_threshold_monotone(values in readings(60), t in -500.0f64..0.0, slack in 0.0f64..200.0) {
        let series = Series::new(values);
        let deep = decide(&series, &DetectionConfig::default().with_threshold(t)).unwrap();
        let shallow_t = (t + slack).min(0.0);
        let shallow = decide(&series, &DetectionConfig::default().with_threshold(shallow_t)).unwrap();

        prop_assert_eq!(deep.min_index, shallow.min_index);
        if deep.should_flatten {
            prop_assert!(shallow.should_flatten);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_min_index_zero_is_noop(values in readings(60), seed in any::<u64>()) {
        let series = Series::new(values);
        let decision = FlattenDecision {
            should_flatten: true,
            min_index: 0,
            cusum_min: -100.0,
            sanity: None,
            criterion: CriterionKind::Cusum,
            threshold: -80.0,
        };

        let flat = Flattener::new(&DetectionConfig::default())
            .flatten(&series, &decision, &mut StdRng::seed_from_u64(seed))
            .unwrap();
        prop_assert_eq!(flat.readings.as_slice(), series.readings());
    }

    #[test]
    fn prop_flatten_stays_in_noise_band(values in readings(60), seed in any::<u64>()) {
        let series = Series::new(values);
        let config = DetectionConfig::default();
        let decision = decide(&series, &config).unwrap();

        let flat = Flattener::new(&config)
            .flatten(&series, &decision, &mut StdRng::seed_from_u64(seed))
            .unwrap();

        prop_assert_eq!(flat.readings.len(), series.len());
        if decision.should_flatten {
            let target = series.readings()[decision.min_index];
            for &v in &flat.readings[..decision.min_index] {
                prop_assert!((v - target).abs() <= flat.noise_scale + 1e-9);
            }
            prop_assert_eq!(&flat.readings[decision.min_index..], &series.readings()[decision.min_index..]);
        } else {
            prop_assert_eq!(flat.readings.as_slice(), series.readings());
        }
    }
}
