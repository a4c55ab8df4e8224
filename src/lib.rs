//! pcr-flatten - CUSUM trend detection and baseline flattening for PCR curves
//!
//! Amplification runs sometimes sag over their first cycles before the
//! exponential phase. This library finds such a sustained leading decline
//! with a one-sided CUSUM statistic over the smoothed readings, decides
//! whether it is deep enough (and plausible enough) to remove, and replaces
//! the affected prefix with a near-constant value.
//!
//! Core operations in [`detection`], [`flattener`] and [`comparison`] are
//! pure functions of their arguments. [`batch`] runs them over a
//! [`records::ReadingSource`] in parallel.

pub mod batch;
pub mod cli;
pub mod comparison;
pub mod csv_output;
pub mod detection;
pub mod error;
pub mod flattener;
pub mod json_output;
pub mod records;
pub mod series;

pub use error::{FlattenError, Result};
pub use series::Series;
