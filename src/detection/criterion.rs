// Decision criteria behind one interface
//
// The comparator only needs `(series, config) -> FlattenDecision`; it never
// looks at which statistic was used to get there.

use crate::detection::config::DetectionConfig;
use crate::detection::cusum::cusum;
use crate::detection::decision::{CriterionKind, FlattenDecision};
use crate::detection::derivative::derivative_minimum;
use crate::detection::minimum::locate_minimum;
use crate::detection::sanity::check_sanity;
use crate::detection::smoothing::smooth;
use crate::error::{FlattenError, Result};
use crate::series::{ensure_finite, Series};

/// A pluggable flatten/no-flatten rule
pub trait DecisionCriterion {
    fn kind(&self) -> CriterionKind;

    /// Evaluate one series; must not depend on anything but its arguments
    fn decide(&self, series: &Series, config: &DetectionConfig) -> Result<FlattenDecision>;
}

/// normalize → smooth → CUSUM(k) → minimum → sanity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CusumCriterion {
    pub k: f64,
}

impl DecisionCriterion for CusumCriterion {
    fn kind(&self) -> CriterionKind {
        CriterionKind::Cusum
    }

    fn decide(&self, series: &Series, config: &DetectionConfig) -> Result<FlattenDecision> {
        if !self.k.is_finite() || self.k < 0.0 {
            return Err(FlattenError::parameter(format!(
                "CUSUM tolerance k must be finite and >= 0, got {}",
                self.k
            )));
        }
        config.validate_common()?;

        let readings = series.readings();
        ensure_finite(readings, "reading")?;

        let scaled = config.normalization.apply(readings);
        let smoothed = smooth(&scaled, config.smoothing_window)?;
        let statistic = cusum(&smoothed, self.k)?;
        let minimum = locate_minimum(&statistic)?;

        let sanity = check_sanity(readings, minimum.index, &config.sanity)?;
        let threshold_met = minimum.value <= config.threshold;
        let sanity_passed = sanity.map_or(true, |verdict| verdict.passed);

        Ok(FlattenDecision {
            should_flatten: threshold_met && sanity_passed,
            min_index: minimum.index,
            cusum_min: minimum.value,
            sanity,
            criterion: self.kind(),
            threshold: config.threshold,
        })
    }
}

/// Steepest raw single-step drop compared against `threshold`
///
/// Sanity checks do not apply to this criterion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivativeCriterion {
    pub threshold: f64,
}

impl DecisionCriterion for DerivativeCriterion {
    fn kind(&self) -> CriterionKind {
        CriterionKind::Derivative
    }

    fn decide(&self, series: &Series, _config: &DetectionConfig) -> Result<FlattenDecision> {
        if !self.threshold.is_finite() {
            return Err(FlattenError::parameter(format!(
                "derivative threshold must be finite, got {}",
                self.threshold
            )));
        }

        let readings = series.readings();
        ensure_finite(readings, "reading")?;
        let minimum = derivative_minimum(readings)?;

        Ok(FlattenDecision {
            should_flatten: minimum.value <= self.threshold,
            min_index: minimum.index,
            cusum_min: minimum.value,
            sanity: None,
            criterion: self.kind(),
            threshold: self.threshold,
        })
    }
}
