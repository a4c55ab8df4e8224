//! Parameter comparison: where does the flatten decision flip?
//!
//! Runs two independent decisions over the same series (for example CUSUM
//! with `k = 0` against CUSUM with `k = 0.3`, or CUSUM against the derivative
//! criterion) and classifies the difference. Both configurations are validated
//! before either one is evaluated.

use crate::detection::{decide, DetectionConfig, FlattenDecision};
use crate::error::Result;
use crate::series::Series;
use serde::{Deserialize, Serialize};

/// How the decision changed from the default to the test configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionChange {
    Unchanged,
    /// Default did not flatten, test does
    NewlyFlattens,
    /// Default flattened, test does not
    NoLongerFlattens,
}

impl DecisionChange {
    pub fn classify(default_flattens: bool, test_flattens: bool) -> Self {
        match (default_flattens, test_flattens) {
            (false, true) => Self::NewlyFlattens,
            (true, false) => Self::NoLongerFlattens,
            _ => Self::Unchanged,
        }
    }

    pub fn is_change(self) -> bool {
        self != Self::Unchanged
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Unchanged => "NO CHANGE IN FLATTENING",
            Self::NewlyFlattens => "DEFAULT NOT FLATTENED → TEST FLATTENED",
            Self::NoLongerFlattens => "DEFAULT FLATTENED → TEST NOT FLATTENED",
        }
    }
}

/// Both decisions for one record plus their classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub default: FlattenDecision,
    pub test: FlattenDecision,
    pub change: DecisionChange,
}

/// Which comparison results a report keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonFilter {
    /// Records whose decision flips
    #[default]
    Changes,
    /// Records the test configuration would flatten
    Threshold,
    /// Records the test configuration's sanity check vetoed
    Sanity,
    All,
}

impl ComparisonFilter {
    pub fn matches(self, result: &ComparisonResult) -> bool {
        match self {
            Self::Changes => result.change.is_change(),
            Self::Threshold => result.test.should_flatten,
            Self::Sanity => result.test.rejected_by_sanity(),
            Self::All => true,
        }
    }
}

/// Compares a default and a test configuration record by record
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterComparator {
    default: DetectionConfig,
    test: DetectionConfig,
}

impl ParameterComparator {
    /// Build a comparator; both configurations must be valid
    pub fn new(default: DetectionConfig, test: DetectionConfig) -> Result<Self> {
        default.validate()?;
        test.validate()?;
        Ok(Self { default, test })
    }

    pub fn default_config(&self) -> &DetectionConfig {
        &self.default
    }

    pub fn test_config(&self) -> &DetectionConfig {
        &self.test
    }

    /// Evaluate both configurations against the same series
    pub fn compare(&self, series: &Series) -> Result<ComparisonResult> {
        let default = decide(series, &self.default)?;
        let test = decide(series, &self.test)?;
        let change = DecisionChange::classify(default.should_flatten, test.should_flatten);

        Ok(ComparisonResult {
            default,
            test,
            change,
        })
    }

    /// "k=0 vs k=0.3 (threshold -80)"
    pub fn describe(&self) -> String {
        format!(
            "{} vs {} (threshold {} / {})",
            self.default.criterion.label(),
            self.test.criterion.label(),
            self.default.threshold,
            self.test.threshold
        )
    }
}

/// One-shot comparison of `series` under two configurations
///
/// # Example
/// ```
/// use pcr_flatten::comparison::{compare, DecisionChange};
/// use pcr_flatten::detection::DetectionConfig;
/// use pcr_flatten::Series;
///
/// // 400 cycles declining 0.25 per step: deep under k=0, invisible under k=0.3
/// let series = Series::new((0..400).map(|i| 500.0 - 0.25 * i as f64).collect());
/// let result = compare(
///     &series,
///     &DetectionConfig::default().with_k(0.0),
///     &DetectionConfig::default().with_k(0.3),
/// )
/// .unwrap();
/// assert_eq!(result.change, DecisionChange::NoLongerFlattens);
/// ```
pub fn compare(
    series: &Series,
    default: &DetectionConfig,
    test: &DetectionConfig,
) -> Result<ComparisonResult> {
    ParameterComparator::new(default.clone(), test.clone())?.compare(series)
}
