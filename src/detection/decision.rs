// Flatten decisions
//
// `decide` validates the whole configuration before touching the readings,
// then hands off to the configured criterion. Errors from any stage surface
// unchanged.

use crate::detection::config::{Criterion, DetectionConfig};
use crate::detection::criterion::{CusumCriterion, DecisionCriterion, DerivativeCriterion};
use crate::detection::sanity::SanityVerdict;
use crate::error::Result;
use crate::series::Series;
use serde::{Deserialize, Serialize};

/// Criterion that produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionKind {
    Cusum,
    Derivative,
}

/// Whether (and from where) to flatten one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlattenDecision {
    pub should_flatten: bool,

    /// First index of the located minimum; readings before it get replaced
    pub min_index: usize,

    /// Minimum of the decision statistic (steepest drop for the derivative criterion)
    pub cusum_min: f64,

    /// `None` when sanity checking is off
    pub sanity: Option<SanityVerdict>,

    pub criterion: CriterionKind,

    pub threshold: f64,
}

impl FlattenDecision {
    /// The statistic reached the threshold, regardless of the sanity check
    pub fn threshold_met(&self) -> bool {
        self.cusum_min <= self.threshold
    }

    pub fn sanity_passed(&self) -> bool {
        self.sanity.map_or(true, |verdict| verdict.passed)
    }

    /// Reached the threshold but was vetoed by the sanity check
    pub fn rejected_by_sanity(&self) -> bool {
        self.threshold_met() && !self.sanity_passed()
    }
}

/// Decide whether to flatten `series` under `config`
///
/// # Example
/// ```
/// use pcr_flatten::detection::{decide, DetectionConfig};
/// use pcr_flatten::Series;
///
/// let series = Series::new(vec![100.0, 95.0, 85.0, 70.0, 50.0, 70.0, 85.0, 95.0, 100.0]);
/// let config = DetectionConfig::default().with_window(1).with_threshold(-40.0);
///
/// let decision = decide(&series, &config).unwrap();
/// assert!(decision.should_flatten);
/// assert_eq!(decision.min_index, 4);
/// assert_eq!(decision.cusum_min, -50.0);
/// ```
pub fn decide(series: &Series, config: &DetectionConfig) -> Result<FlattenDecision> {
    config.validate()?;

    let decision = match config.criterion {
        Criterion::Cusum { k } => CusumCriterion { k }.decide(series, config)?,
        Criterion::Derivative { threshold } => {
            DerivativeCriterion { threshold }.decide(series, config)?
        }
    };

    tracing::debug!(
        criterion = ?decision.criterion,
        min_index = decision.min_index,
        minimum = decision.cusum_min,
        threshold = decision.threshold,
        should_flatten = decision.should_flatten,
        "flatten decision"
    );

    Ok(decision)
}
