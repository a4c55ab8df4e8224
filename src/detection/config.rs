// Configuration for flattening decisions
//
// Every knob the engine reads lives here so a single value can be validated
// up front, serialized next to results, and loaded from TOML.

use crate::detection::sanity::SanityMode;
use crate::detection::smoothing::DEFAULT_WINDOW;
use crate::error::{FlattenError, Result};
use crate::series::Normalization;
use serde::{Deserialize, Serialize};

/// Default CUSUM flatten threshold
pub const DEFAULT_THRESHOLD: f64 = -80.0;

/// Default threshold for the rate-of-change criterion
pub const DEFAULT_DERIVATIVE_THRESHOLD: f64 = -0.1;

/// Default noise amplitude as a fraction of the series standard deviation
pub const DEFAULT_NOISE_FRACTION: f64 = 0.001;

/// Statistic a decision is based on
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Criterion {
    /// Lower CUSUM with per-step tolerance `k`
    Cusum {
        #[serde(default)]
        k: f64,
    },
    /// Steepest single-step drop between raw readings
    Derivative { threshold: f64 },
}

impl Default for Criterion {
    fn default() -> Self {
        Self::Cusum { k: 0.0 }
    }
}

impl Criterion {
    pub fn derivative() -> Self {
        Self::Derivative {
            threshold: DEFAULT_DERIVATIVE_THRESHOLD,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Cusum { k } if !k.is_finite() || k < 0.0 => Err(FlattenError::parameter(
                format!("CUSUM tolerance k must be finite and >= 0, got {}", k),
            )),
            Self::Derivative { threshold } if !threshold.is_finite() => {
                Err(FlattenError::parameter(format!(
                    "derivative threshold must be finite, got {}",
                    threshold
                )))
            }
            _ => Ok(()),
        }
    }

    /// Short label used in reports ("k=0.3", "derivative<=-0.1")
    pub fn label(&self) -> String {
        match *self {
            Self::Cusum { k } => format!("k={}", k),
            Self::Derivative { threshold } => format!("derivative<={}", threshold),
        }
    }
}

/// Which curve supplies the flattening target value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TargetSource {
    /// Raw reading at the minimum index
    #[default]
    Raw,
    /// Smoothed raw reading at the minimum index
    Smoothed,
}

/// Configuration for one flattening decision
///
/// # Example
/// ```
/// use pcr_flatten::detection::DetectionConfig;
///
/// let config = DetectionConfig::default();
/// assert_eq!(config.threshold, -80.0);
/// assert_eq!(config.smoothing_window, 5);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub criterion: Criterion,

    /// CUSUM minimum at or below this flattens (negative; more negative is stricter)
    pub threshold: f64,

    pub sanity: SanityMode,

    /// Centered moving-average width (positive, odd)
    pub smoothing_window: usize,

    /// Rescaling applied before smoothing
    pub normalization: Normalization,

    pub target: TargetSource,

    /// Noise half-width as a fraction of the series standard deviation
    pub noise_fraction: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            criterion: Criterion::default(),
            threshold: DEFAULT_THRESHOLD,
            sanity: SanityMode::Off,
            smoothing_window: DEFAULT_WINDOW,
            normalization: Normalization::None,
            target: TargetSource::Raw,
            noise_fraction: DEFAULT_NOISE_FRACTION,
        }
    }
}

impl DetectionConfig {
    /// Fewer false positives: deeper threshold, slope check on
    pub fn strict() -> Self {
        Self {
            threshold: -120.0,
            sanity: SanityMode::slope(),
            ..Self::default()
        }
    }

    /// Catch shallow declines: shallower threshold, average check on
    pub fn permissive() -> Self {
        Self {
            threshold: -40.0,
            sanity: SanityMode::average(),
            ..Self::default()
        }
    }

    pub fn with_k(mut self, k: f64) -> Self {
        self.criterion = Criterion::Cusum { k };
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_sanity(mut self, sanity: SanityMode) -> Self {
        self.sanity = sanity;
        self
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.smoothing_window = window;
        self
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)
            .map_err(|e| FlattenError::parameter(format!("invalid detection config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate everything, including criterion parameters
    pub fn validate(&self) -> Result<()> {
        self.criterion.validate()?;
        self.validate_common()
    }

    /// Validate the settings shared by all criteria
    pub(crate) fn validate_common(&self) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold > 0.0 {
            return Err(FlattenError::parameter(format!(
                "threshold must be finite and <= 0, got {}",
                self.threshold
            )));
        }

        if self.smoothing_window == 0 || self.smoothing_window % 2 == 0 {
            return Err(FlattenError::parameter(format!(
                "smoothing_window must be a positive odd integer, got {}",
                self.smoothing_window
            )));
        }

        if !self.noise_fraction.is_finite() || self.noise_fraction < 0.0 {
            return Err(FlattenError::parameter(format!(
                "noise_fraction must be finite and >= 0, got {}",
                self.noise_fraction
            )));
        }

        self.sanity.validate()?;
        self.normalization.validate()
    }
}
