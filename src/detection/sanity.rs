// Sanity checks on a located CUSUM minimum
//
// A CUSUM minimum can come from an early spike or from noise rather than a real
// decline. Each strategy is a pure function of the raw readings and the
// minimum's index; exactly one runs per decision.
//
// - Average: the reading at the minimum must sit below an early baseline.
// - Slope: a least-squares line over [0, min_index] must point downward.

use crate::error::{FlattenError, Result};
use serde::{Deserialize, Serialize};

/// How many leading readings form the average baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BaselineRule {
    /// 2 readings when `min_index < 5`, otherwise 5
    ///
    /// The jump at index 5 is inherited behavior; kept as the default so
    /// decisions match previously flattened data.
    #[default]
    Legacy,
    /// `clamp(min_index, 1, 5)` readings
    Continuous,
}

impl BaselineRule {
    fn leading_count(self, min_index: usize) -> usize {
        match self {
            Self::Legacy => {
                if min_index < 5 {
                    2
                } else {
                    5
                }
            }
            Self::Continuous => min_index.clamp(1, 5),
        }
    }
}

/// Which sanity check (if any) a decision runs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SanityMode {
    #[default]
    Off,
    Average {
        #[serde(default)]
        rule: BaselineRule,
    },
    Slope {
        /// Slope must be below `-tolerance` to pass
        #[serde(default)]
        tolerance: f64,
    },
}

impl SanityMode {
    pub fn average() -> Self {
        Self::Average {
            rule: BaselineRule::Legacy,
        }
    }

    pub fn slope() -> Self {
        Self::Slope { tolerance: 0.0 }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Off)
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Slope { tolerance } if !tolerance.is_finite() || tolerance < 0.0 => {
                Err(FlattenError::parameter(format!(
                    "slope tolerance must be finite and >= 0, got {}",
                    tolerance
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Strategy that produced a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanityStrategy {
    Average,
    Slope,
}

/// Outcome of a sanity check
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SanityVerdict {
    pub strategy: SanityStrategy,
    pub passed: bool,
    /// Average: early-reading mean. Slope: `-tolerance`.
    pub baseline: f64,
    /// Average: reading at the minimum. Slope: fitted slope.
    pub observed: f64,
}

/// Run the configured sanity check
///
/// Returns `Ok(None)` when sanity checking is off.
pub fn check_sanity(
    readings: &[f64],
    min_index: usize,
    mode: &SanityMode,
) -> Result<Option<SanityVerdict>> {
    if !mode.is_enabled() {
        return Ok(None);
    }
    if min_index >= readings.len() {
        return Err(FlattenError::input(format!(
            "minimum index {} out of range for {} readings",
            min_index,
            readings.len()
        )));
    }

    let verdict = match *mode {
        SanityMode::Off => return Ok(None),
        SanityMode::Average { rule } => average_verdict(readings, min_index, rule),
        SanityMode::Slope { tolerance } => slope_verdict(readings, min_index, tolerance),
    };

    Ok(Some(verdict))
}

fn average_verdict(readings: &[f64], min_index: usize, rule: BaselineRule) -> SanityVerdict {
    let count = rule.leading_count(min_index).min(readings.len());
    let baseline = readings[..count].iter().sum::<f64>() / count as f64;
    let observed = readings[min_index];

    SanityVerdict {
        strategy: SanityStrategy::Average,
        passed: observed < baseline,
        baseline,
        observed,
    }
}

fn slope_verdict(readings: &[f64], min_index: usize, tolerance: f64) -> SanityVerdict {
    let slope = least_squares_slope(&readings[..=min_index]);

    SanityVerdict {
        strategy: SanityStrategy::Slope,
        passed: slope < -tolerance,
        baseline: -tolerance,
        observed: slope,
    }
}

/// Ordinary least-squares slope of `ys` against `0..n`
///
/// Fewer than two points carry no trend; the slope is reported as 0.
fn least_squares_slope(ys: &[f64]) -> f64 {
    let n = ys.len();
    if n < 2 {
        return 0.0;
    }

    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = ys.iter().sum::<f64>() / n as f64;

    let (sxy, sxx) = ys
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(sxy, sxx), (i, &y)| {
            let dx = i as f64 - x_mean;
            (sxy + dx * (y - y_mean), sxx + dx * dx)
        });

    sxy / sxx
}
