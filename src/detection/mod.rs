// Downward-trend detection for amplification curves
//
// Pipeline (one record at a time, no shared state):
//
//   raw readings → normalize → smooth → CUSUM → minimum → sanity check → decision
//
// The CUSUM statistic is one-sided and clipped at zero, so it only ever
// accumulates sustained declines. The first index where it bottoms out marks
// the end of the decline; everything before it is a candidate for flattening.
//
// Two criteria share one interface (`DecisionCriterion`): the CUSUM engine and
// a rate-of-change criterion that looks at the steepest single-step drop. The
// parameter comparator can put either criterion on either side.

mod config;
mod criterion;
mod cusum;
mod decision;
mod derivative;
mod minimum;
mod sanity;
mod smoothing;

pub use config::{
    Criterion, DetectionConfig, TargetSource, DEFAULT_DERIVATIVE_THRESHOLD, DEFAULT_NOISE_FRACTION,
    DEFAULT_THRESHOLD,
};
pub use criterion::{CusumCriterion, DecisionCriterion, DerivativeCriterion};
pub use cusum::cusum;
pub use decision::{decide, CriterionKind, FlattenDecision};
pub use derivative::{derivative, derivative_minimum};
pub use minimum::{locate_minimum, MinimumPoint};
pub use sanity::{check_sanity, BaselineRule, SanityMode, SanityStrategy, SanityVerdict};
pub use smoothing::{smooth, DEFAULT_WINDOW};
