//! Flattening: replace a detected leading decline with near-constant readings
//!
//! Readings before the decision's `min_index` become `target + noise`, where
//! noise is drawn i.i.d. from a uniform distribution on `[-s, s]` and
//! `s = noise_fraction × std_dev(series)`. The tiny jitter keeps the region
//! from being perfectly flat without carrying any real signal. Readings from
//! `min_index` on are copied unchanged.
//!
//! The RNG is injected so callers can seed it and get reproducible output.

use crate::detection::{decide, smooth, DetectionConfig, FlattenDecision, TargetSource};
use crate::error::{FlattenError, Result};
use crate::series::{ensure_finite, Series};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Output of [`Flattener::flatten`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlattenedSeries {
    pub readings: Vec<f64>,

    /// False when the decision said not to flatten (readings are a copy of the input)
    pub flattened: bool,

    pub min_index: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_value: Option<f64>,

    /// Half-width of the uniform noise
    pub noise_scale: f64,

    /// Replacement for the record's summary result: the reading just before
    /// the flattening point plus one noise draw
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_value: Option<f64>,
}

impl FlattenedSeries {
    fn unchanged(readings: &[f64]) -> Self {
        Self {
            readings: readings.to_vec(),
            flattened: false,
            min_index: 0,
            target_value: None,
            noise_scale: 0.0,
            result_value: None,
        }
    }

    /// Wrap the output as a new series (no std-dev metadata carried over)
    pub fn to_series(&self) -> Series {
        Series::new(self.readings.clone())
    }
}

/// Applies flatten decisions
#[derive(Debug, Clone, PartialEq)]
pub struct Flattener {
    target: TargetSource,
    smoothing_window: usize,
    noise_fraction: f64,
}

impl Flattener {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            target: config.target,
            smoothing_window: config.smoothing_window,
            noise_fraction: config.noise_fraction,
        }
    }

    /// Apply `decision` to `series`
    ///
    /// A negative decision returns the readings unchanged. `min_index == 0`
    /// is a valid empty replacement range.
    ///
    /// # Example
    /// ```
    /// use pcr_flatten::detection::{decide, DetectionConfig};
    /// use pcr_flatten::flattener::Flattener;
    /// use pcr_flatten::Series;
    /// use rand::{rngs::StdRng, SeedableRng};
    ///
    /// let series = Series::new(vec![100.0, 95.0, 85.0, 70.0, 50.0, 70.0, 85.0, 95.0, 100.0]);
    /// let config = DetectionConfig::default().with_window(1).with_threshold(-40.0);
    /// let decision = decide(&series, &config).unwrap();
    ///
    /// let mut rng = StdRng::seed_from_u64(7);
    /// let flat = Flattener::new(&config).flatten(&series, &decision, &mut rng).unwrap();
    /// assert!(flat.readings[..4].iter().all(|v| (v - 50.0).abs() < 0.1));
    /// assert_eq!(&flat.readings[4..], &series.readings()[4..]);
    /// ```
    pub fn flatten<R: Rng + ?Sized>(
        &self,
        series: &Series,
        decision: &FlattenDecision,
        rng: &mut R,
    ) -> Result<FlattenedSeries> {
        let readings = series.readings();
        if !decision.should_flatten {
            return Ok(FlattenedSeries::unchanged(readings));
        }

        let min_index = decision.min_index;
        if min_index >= readings.len() {
            return Err(FlattenError::input(format!(
                "flatten index {} out of range for {} readings",
                min_index,
                readings.len()
            )));
        }
        ensure_finite(readings, "reading")?;

        let target_value = match self.target {
            TargetSource::Raw => readings[min_index],
            TargetSource::Smoothed => smooth(readings, self.smoothing_window)?[min_index],
        };
        let noise_scale = self.noise_fraction * series.std_dev()?;
        // The sampled interval is 2s wide and must stay finite
        if !(2.0 * noise_scale).is_finite() {
            return Err(FlattenError::input(format!(
                "noise scale {} is too large to sample",
                noise_scale
            )));
        }

        let mut out = readings.to_vec();
        for value in &mut out[..min_index] {
            *value = target_value + sample_noise(rng, noise_scale);
        }

        let before = readings[min_index.saturating_sub(1)];
        let result_value = before + sample_noise(rng, noise_scale);

        Ok(FlattenedSeries {
            readings: out,
            flattened: true,
            min_index,
            target_value: Some(target_value),
            noise_scale,
            result_value: Some(result_value),
        })
    }
}

/// Decide and flatten in one step
pub fn flatten_series<R: Rng + ?Sized>(
    series: &Series,
    config: &DetectionConfig,
    rng: &mut R,
) -> Result<(FlattenDecision, FlattenedSeries)> {
    let decision = decide(series, config)?;
    let flattened = Flattener::new(config).flatten(series, &decision, rng)?;
    Ok((decision, flattened))
}

fn sample_noise<R: Rng + ?Sized>(rng: &mut R, scale: f64) -> f64 {
    if scale.is_finite() && scale > 0.0 {
        rng.gen_range(-scale..=scale)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::CriterionKind;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn decision(should_flatten: bool, min_index: usize) -> FlattenDecision {
        FlattenDecision {
            should_flatten,
            min_index,
            cusum_min: -100.0,
            sanity: None,
            criterion: CriterionKind::Cusum,
            threshold: -80.0,
        }
    }

    fn series() -> Series {
        Series::new(vec![900.0, 800.0, 700.0, 600.0, 500.0, 520.0, 700.0, 1500.0])
    }

    #[test]
    fn test_negative_decision_is_noop() {
        let mut rng = StdRng::seed_from_u64(1);
        let flattener = Flattener::new(&DetectionConfig::default());
        let flat = flattener
            .flatten(&series(), &decision(false, 4), &mut rng)
            .unwrap();

        assert!(!flat.flattened);
        assert_eq!(flat.readings, series().readings());
        assert!(flat.result_value.is_none());
    }

    #[test]
    fn test_min_index_zero_keeps_readings() {
        let mut rng = StdRng::seed_from_u64(1);
        let flattener = Flattener::new(&DetectionConfig::default());
        let flat = flattener
            .flatten(&series(), &decision(true, 0), &mut rng)
            .unwrap();

        assert!(flat.flattened);
        assert_eq!(flat.readings, series().readings());
    }

    #[test]
    fn test_replaces_prefix_within_noise_band() {
        let mut rng = StdRng::seed_from_u64(42);
        let flattener = Flattener::new(&DetectionConfig::default());
        let input = series();
        let flat = flattener.flatten(&input, &decision(true, 4), &mut rng).unwrap();

        let scale = flat.noise_scale;
        assert!(scale > 0.0);
        assert_eq!(flat.target_value, Some(500.0));
        for &v in &flat.readings[..4] {
            assert!((v - 500.0).abs() <= scale, "{} outside ±{}", v, scale);
        }
        assert_eq!(&flat.readings[4..], &input.readings()[4..]);

        // Reading before the flattening point (600) plus noise
        let result = flat.result_value.unwrap();
        assert!((result - 600.0).abs() <= scale);
    }

    #[test]
    fn test_noise_scale_uses_stored_std_dev() {
        let mut rng = StdRng::seed_from_u64(3);
        let input = series().with_std_dev(1000.0);
        let flat = Flattener::new(&DetectionConfig::default())
            .flatten(&input, &decision(true, 3), &mut rng)
            .unwrap();
        assert!((flat.noise_scale - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_noise_fraction_is_exactly_flat() {
        let mut rng = StdRng::seed_from_u64(3);
        let config = DetectionConfig {
            noise_fraction: 0.0,
            ..DetectionConfig::default()
        };
        let flat = Flattener::new(&config)
            .flatten(&series(), &decision(true, 4), &mut rng)
            .unwrap();
        assert!(flat.readings[..4].iter().all(|&v| v == 500.0));
    }

    #[test]
    fn test_smoothed_target() {
        let mut rng = StdRng::seed_from_u64(3);
        let config = DetectionConfig {
            target: TargetSource::Smoothed,
            noise_fraction: 0.0,
            smoothing_window: 3,
            ..DetectionConfig::default()
        };
        let flat = Flattener::new(&config)
            .flatten(&series(), &decision(true, 4), &mut rng)
            .unwrap();
        // mean(600, 500, 520)
        assert!((flat.target_value.unwrap() - 540.0).abs() < 1e-9);
    }

    #[test]
    fn test_last_index_replaces_nearly_everything() {
        let mut rng = StdRng::seed_from_u64(5);
        let input = series();
        let last = input.len() - 1;
        let flat = Flattener::new(&DetectionConfig::default())
            .flatten(&input, &decision(true, last), &mut rng)
            .unwrap();
        assert_eq!(flat.readings[last], 1500.0);
        assert!(flat.readings[..last]
            .iter()
            .all(|v| (v - 1500.0).abs() <= flat.noise_scale));
    }

    #[test]
    fn test_same_seed_same_output() {
        let flattener = Flattener::new(&DetectionConfig::default());
        let a = flattener
            .flatten(&series(), &decision(true, 4), &mut StdRng::seed_from_u64(9))
            .unwrap();
        let b = flattener
            .flatten(&series(), &decision(true, 4), &mut StdRng::seed_from_u64(9))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_huge_readings_flatten_without_panicking() {
        let input = Series::new(
            (0..20)
                .map(|i| if i < 10 { 3e19 - 3e18 * i as f64 } else { 3e18 })
                .collect(),
        );
        let config = DetectionConfig::default();
        let decision = decide(&input, &config).unwrap();
        assert!(decision.should_flatten);
        assert_eq!(decision.min_index, 11);

        let mut rng = StdRng::seed_from_u64(11);
        let flat = Flattener::new(&config)
            .flatten(&input, &decision, &mut rng)
            .unwrap();

        assert!(flat.noise_scale.is_finite() && flat.noise_scale > 0.0);
        assert!(flat.readings.iter().all(|v| v.is_finite()));
        for &v in &flat.readings[..11] {
            assert!((v - 3e18).abs() <= flat.noise_scale * (1.0 + 1e-9));
        }
        assert_eq!(&flat.readings[11..], &input.readings()[11..]);
    }

    #[test]
    fn test_unsampleable_noise_scale_is_an_error() {
        let mut rng = StdRng::seed_from_u64(2);
        let config = DetectionConfig {
            noise_fraction: 1.0,
            ..DetectionConfig::default()
        };
        let err = Flattener::new(&config)
            .flatten(&series().with_std_dev(f64::MAX), &decision(true, 4), &mut rng)
            .unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_out_of_range_index() {
        let mut rng = StdRng::seed_from_u64(1);
        let err = Flattener::new(&DetectionConfig::default())
            .flatten(&series(), &decision(true, 8), &mut rng)
            .unwrap_err();
        assert!(err.is_invalid_input());
    }
}
