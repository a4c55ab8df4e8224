//! JSON output format for decision, flattening and comparison runs
//!
//! Every document carries a `version` (crate version) and a `format`
//! identifier so downstream tooling can detect schema changes.

use crate::batch::{BatchReport, ComparisonReport, RecordFailure};
use crate::comparison::DecisionChange;
use crate::detection::{CriterionKind, DetectionConfig, SanityStrategy};
use crate::records::RecordId;
use serde::{Deserialize, Serialize};

/// Sanity verdict as reported
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonSanity {
    pub strategy: SanityStrategy,
    pub passed: bool,
    pub baseline: f64,
    pub observed: f64,
}

/// One record's decision (and flattening, if applied)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRecord {
    pub id: RecordId,
    pub criterion: CriterionKind,
    pub should_flatten: bool,
    pub min_index: usize,
    /// Minimum of the decision statistic
    pub minimum: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sanity: Option<JsonSanity>,
    /// Flattened readings (flatten runs only, and only for flattened records)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readings: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_value: Option<f64>,
}

/// Batch summary counts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JsonSummary {
    pub processed: usize,
    pub flattened: usize,
    pub sanity_rejections: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonFailure {
    pub id: RecordId,
    pub error: String,
}

impl From<&RecordFailure> for JsonFailure {
    fn from(failure: &RecordFailure) -> Self {
        Self {
            id: failure.id,
            error: failure.error.clone(),
        }
    }
}

/// Complete JSON document for a decide or flatten run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonOutput {
    /// Format version identifier
    pub version: String,
    /// Format name
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<DetectionConfig>,
    pub records: Vec<JsonRecord>,
    pub summary: JsonSummary,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<JsonFailure>,
}

impl JsonOutput {
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            format: "pcr-flatten-json-v1".to_string(),
            config: None,
            records: Vec::new(),
            summary: JsonSummary::default(),
            failures: Vec::new(),
        }
    }

    /// Add a record; summary counts follow
    pub fn add_record(&mut self, record: JsonRecord) {
        self.summary.processed += 1;
        if record.should_flatten {
            self.summary.flattened += 1;
        }
        if record.sanity.as_ref().is_some_and(|s| !s.passed) && record.minimum <= self.threshold()
        {
            self.summary.sanity_rejections += 1;
        }
        self.records.push(record);
    }

    pub fn add_failure(&mut self, failure: JsonFailure) {
        self.summary.failed += 1;
        self.failures.push(failure);
    }

    pub fn set_skipped(&mut self, skipped: usize) {
        self.summary.skipped = skipped;
    }

    pub fn set_config(&mut self, config: DetectionConfig) {
        self.config = Some(config);
    }

    fn threshold(&self) -> f64 {
        self.config
            .as_ref()
            .map_or(f64::NEG_INFINITY, |config| config.threshold)
    }

    /// Build the document for a finished batch
    pub fn from_report(report: &BatchReport) -> Self {
        let mut output = Self::new();
        output.set_config(report.config.clone());

        for outcome in &report.outcomes {
            let decision = &outcome.decision;
            let flattened = outcome.flattened.as_ref().filter(|f| f.flattened);
            output.add_record(JsonRecord {
                id: outcome.id,
                criterion: decision.criterion,
                should_flatten: decision.should_flatten,
                min_index: decision.min_index,
                minimum: decision.cusum_min,
                sanity: decision.sanity.map(|v| JsonSanity {
                    strategy: v.strategy,
                    passed: v.passed,
                    baseline: v.baseline,
                    observed: v.observed,
                }),
                readings: flattened.map(|f| f.readings.clone()),
                result_value: flattened.and_then(|f| f.result_value),
            });
        }

        for failure in &report.failures {
            output.add_failure(failure.into());
        }
        output.set_skipped(report.skipped.len());
        output
    }
}

impl Default for JsonOutput {
    fn default() -> Self {
        Self::new()
    }
}

/// One side of a comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonSide {
    pub criterion: CriterionKind,
    pub should_flatten: bool,
    pub min_index: usize,
    pub minimum: f64,
    pub sanity_passed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonComparisonEntry {
    pub id: RecordId,
    pub change: DecisionChange,
    pub default: JsonSide,
    pub test: JsonSide,
}

/// Complete JSON document for a comparison run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonComparisonOutput {
    pub version: String,
    pub format: String,
    pub description: String,
    pub evaluated: usize,
    pub newly_flattened: usize,
    pub no_longer_flattened: usize,
    pub skipped: usize,
    pub entries: Vec<JsonComparisonEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<JsonFailure>,
}

impl JsonComparisonOutput {
    pub fn from_report(report: &ComparisonReport) -> Self {
        let side = |d: &crate::detection::FlattenDecision| JsonSide {
            criterion: d.criterion,
            should_flatten: d.should_flatten,
            min_index: d.min_index,
            minimum: d.cusum_min,
            sanity_passed: d.sanity_passed(),
        };

        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            format: "pcr-flatten-comparison-json-v1".to_string(),
            description: report.description.clone(),
            evaluated: report.evaluated,
            newly_flattened: report.newly_flattened,
            no_longer_flattened: report.no_longer_flattened,
            skipped: report.skipped.len(),
            entries: report
                .entries
                .iter()
                .map(|e| JsonComparisonEntry {
                    id: e.id,
                    change: e.result.change,
                    default: side(&e.result.default),
                    test: side(&e.result.test),
                })
                .collect(),
            failures: report.failures.iter().map(JsonFailure::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: RecordId, should_flatten: bool) -> JsonRecord {
        JsonRecord {
            id,
            criterion: CriterionKind::Cusum,
            should_flatten,
            min_index: 4,
            minimum: -120.0,
            sanity: None,
            readings: None,
            result_value: None,
        }
    }

    #[test]
    fn test_json_output_creation() {
        let output = JsonOutput::new();
        assert_eq!(output.format, "pcr-flatten-json-v1");
        assert_eq!(output.records.len(), 0);
        assert_eq!(output.summary.processed, 0);
    }

    #[test]
    fn test_add_record_updates_summary() {
        let mut output = JsonOutput::new();
        output.add_record(record(1, true));
        output.add_record(record(2, false));
        output.add_failure(JsonFailure {
            id: 3,
            error: "invalid input".to_string(),
        });

        assert_eq!(output.summary.processed, 2);
        assert_eq!(output.summary.flattened, 1);
        assert_eq!(output.summary.failed, 1);
    }

    #[test]
    fn test_sanity_rejection_counted_only_past_threshold() {
        let mut output = JsonOutput::new();
        output.set_config(DetectionConfig::default());

        let mut vetoed = record(1, false);
        vetoed.sanity = Some(JsonSanity {
            strategy: SanityStrategy::Average,
            passed: false,
            baseline: 200.0,
            observed: 215.0,
        });
        let mut shallow = vetoed.clone();
        shallow.minimum = -10.0;

        output.add_record(vetoed);
        output.add_record(shallow);
        assert_eq!(output.summary.sanity_rejections, 1);
    }

    #[test]
    fn test_json_serialization() {
        let mut output = JsonOutput::new();
        output.add_record(record(7, true));

        let json = serde_json::to_string(&output).unwrap();
        assert!(json.contains("\"format\":\"pcr-flatten-json-v1\""));
        assert!(json.contains("\"criterion\":\"cusum\""));
        assert!(json.contains("\"min_index\":4"));
        assert!(!json.contains("\"readings\""));
        assert!(!json.contains("\"failures\""));
    }
}
