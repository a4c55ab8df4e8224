//! Reading series and series-level metadata
//!
//! A [`Series`] is one amplification run: the ordered fluorescence readings
//! plus an optional standard deviation supplied by the persistence layer.
//! The core never mutates a series; every derived curve is a fresh `Vec`.

use crate::error::{FlattenError, Result};
use serde::{Deserialize, Serialize};
use trueno::Vector;

/// Plot height that readings are rescaled onto by `Normalization::PlotScale`
pub const PLOT_SCALE_HEIGHT: f64 = 300.0;

/// Ordered fluorescence readings for one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    readings: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    std_dev: Option<f64>,
}

impl Series {
    pub fn new(readings: Vec<f64>) -> Self {
        Self {
            readings,
            std_dev: None,
        }
    }

    /// Attach a precomputed standard deviation (as stored alongside the record)
    pub fn with_std_dev(mut self, std_dev: f64) -> Self {
        self.std_dev = Some(std_dev);
        self
    }

    pub fn readings(&self) -> &[f64] {
        &self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Reject empty series and non-finite readings
    pub fn validate(&self) -> Result<()> {
        if self.readings.is_empty() {
            return Err(FlattenError::input("series has no readings"));
        }
        ensure_finite(&self.readings, "reading")
    }

    /// Population standard deviation of the readings
    ///
    /// Uses the stored metadata when present, otherwise computes it with
    /// trueno's SIMD statistics.
    pub fn std_dev(&self) -> Result<f64> {
        if let Some(std_dev) = self.std_dev {
            if !std_dev.is_finite() || std_dev < 0.0 {
                return Err(FlattenError::input(format!(
                    "stored standard deviation must be finite and non-negative, got {}",
                    std_dev
                )));
            }
            return Ok(std_dev);
        }

        self.validate()?;

        // trueno works in f32: center and scale in f64 first so the f32 values
        // stay in [-1, 1] whatever the reading magnitude
        let mean = self.readings.iter().sum::<f64>() / self.readings.len() as f64;
        let spread = self
            .readings
            .iter()
            .map(|&r| (r - mean).abs())
            .fold(0.0, f64::max);
        if !mean.is_finite() || !spread.is_finite() {
            return Err(FlattenError::input(
                "readings too large to compute a standard deviation",
            ));
        }
        if spread == 0.0 {
            return Ok(0.0);
        }

        let unit: Vec<f32> = self
            .readings
            .iter()
            .map(|&r| ((r - mean) / spread) as f32)
            .collect();
        let std = f64::from(Vector::from_slice(&unit).stddev().unwrap_or(0.0)) * spread;

        if !std.is_finite() {
            return Err(FlattenError::input(format!(
                "standard deviation is not finite: {}",
                std
            )));
        }
        Ok(std)
    }
}

impl From<Vec<f64>> for Series {
    fn from(readings: Vec<f64>) -> Self {
        Self::new(readings)
    }
}

/// Scale applied to readings before smoothing and CUSUM
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Normalization {
    /// Analyse readings in instrument units
    #[default]
    None,
    /// Min-max rescale onto `[0, height]`
    ///
    /// Makes a threshold comparable across records with very different
    /// fluorescence ranges. A flat series maps to all zeros.
    PlotScale { height: f64 },
}

impl Normalization {
    pub fn plot_scale() -> Self {
        Self::PlotScale {
            height: PLOT_SCALE_HEIGHT,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::None => Ok(()),
            Self::PlotScale { height } if height.is_finite() && height > 0.0 => Ok(()),
            Self::PlotScale { height } => Err(FlattenError::parameter(format!(
                "plot scale height must be finite and positive, got {}",
                height
            ))),
        }
    }

    pub fn apply(&self, readings: &[f64]) -> Vec<f64> {
        match *self {
            Self::None => readings.to_vec(),
            Self::PlotScale { height } => {
                let min = readings.iter().copied().fold(f64::INFINITY, f64::min);
                let max = readings.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let range = if max > min { max - min } else { 1.0 };
                readings
                    .iter()
                    .map(|&r| height * (r - min) / range)
                    .collect()
            }
        }
    }
}

pub(crate) fn ensure_finite(values: &[f64], what: &str) -> Result<()> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(FlattenError::input(format!(
            "{} at index {} is not finite ({})",
            what, index, values[index]
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_nan() {
        let series = Series::new(vec![1.0, f64::NAN, 3.0]);
        let err = series.validate().unwrap_err();
        assert!(err.is_invalid_input());
        assert!(err.to_string().contains("index 1"));
    }

    #[test]
    fn test_validate_rejects_empty() {
        assert!(Series::new(vec![]).validate().is_err());
    }

    #[test]
    fn test_std_dev_population() {
        // mean=5, population variance = 20/4 = 5
        let series = Series::new(vec![2.0, 4.0, 6.0, 8.0]);
        let std = series.std_dev().unwrap();
        assert!((std - 5.0_f64.sqrt()).abs() < 1e-4, "got {}", std);
    }

    #[test]
    fn test_std_dev_small_spread_on_large_baseline() {
        let readings: Vec<f64> = (0..40).map(|i| 1e7 + (i % 2) as f64 * 0.5).collect();
        let std = Series::new(readings).std_dev().unwrap();
        assert!((std - 0.25).abs() < 1e-6, "got {}", std);
    }

    #[test]
    fn test_std_dev_finite_for_huge_readings() {
        let readings: Vec<f64> = (0..20)
            .map(|i| if i < 10 { 3e19 - 3e18 * i as f64 } else { 3e18 })
            .collect();
        let std = Series::new(readings).std_dev().unwrap();
        assert!(std.is_finite() && std > 1e18, "got {}", std);
    }

    #[test]
    fn test_std_dev_constant_series_is_zero() {
        assert_eq!(Series::new(vec![7.5; 12]).std_dev().unwrap(), 0.0);
    }

    #[test]
    fn test_std_dev_rejects_overflowing_readings() {
        let err = Series::new(vec![f64::MAX, -f64::MAX, f64::MAX])
            .std_dev()
            .unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_std_dev_prefers_metadata() {
        let series = Series::new(vec![2.0, 4.0, 6.0, 8.0]).with_std_dev(42.0);
        assert_eq!(series.std_dev().unwrap(), 42.0);
    }

    #[test]
    fn test_std_dev_rejects_negative_metadata() {
        let series = Series::new(vec![1.0, 2.0]).with_std_dev(-1.0);
        assert!(series.std_dev().is_err());
    }

    #[test]
    fn test_plot_scale_maps_to_height() {
        let scaled = Normalization::plot_scale().apply(&[10.0, 20.0, 30.0]);
        assert_eq!(scaled, vec![0.0, 150.0, 300.0]);
    }

    #[test]
    fn test_plot_scale_flat_series() {
        let scaled = Normalization::plot_scale().apply(&[5.0, 5.0, 5.0]);
        assert_eq!(scaled, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_plot_scale_rejects_zero_height() {
        assert!(Normalization::PlotScale { height: 0.0 }.validate().is_err());
    }
}
