//! CSV output formats
//!
//! Three shapes: a per-record decision summary, a long-format dump of
//! flattened readings (one row per cycle, written incrementally through
//! [`FlattenSink`]), and a per-record comparison table.

use crate::batch::{BatchReport, ComparisonReport, FlattenSink, RecordOutcome};
use crate::detection::CriterionKind;
use crate::records::RecordId;
use anyhow::{Context, Result};
use std::io::Write;

/// Escape CSV field (handle commas, quotes, newlines)
fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn criterion_name(kind: CriterionKind) -> &'static str {
    match kind {
        CriterionKind::Cusum => "cusum",
        CriterionKind::Derivative => "derivative",
    }
}

/// CSV row for one record's decision
#[derive(Debug, Clone)]
pub struct CsvDecision {
    pub id: RecordId,
    pub criterion: CriterionKind,
    pub should_flatten: bool,
    pub min_index: usize,
    pub minimum: f64,
    /// `None` when sanity checking was off
    pub sanity_passed: Option<bool>,
    pub result_value: Option<f64>,
}

/// Decision summary formatter
#[derive(Debug, Default)]
pub struct CsvOutput {
    rows: Vec<CsvDecision>,
    failures: Vec<(RecordId, String)>,
}

impl CsvOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_decision(&mut self, row: CsvDecision) {
        self.rows.push(row);
    }

    pub fn add_failure(&mut self, id: RecordId, error: &str) {
        self.failures.push((id, error.to_string()));
    }

    pub fn from_report(report: &BatchReport) -> Self {
        let mut output = Self::new();
        for outcome in &report.outcomes {
            let decision = &outcome.decision;
            output.add_decision(CsvDecision {
                id: outcome.id,
                criterion: decision.criterion,
                should_flatten: decision.should_flatten,
                min_index: decision.min_index,
                minimum: decision.cusum_min,
                sanity_passed: decision.sanity.map(|v| v.passed),
                result_value: outcome.flattened.as_ref().and_then(|f| f.result_value),
            });
        }
        for failure in &report.failures {
            output.add_failure(failure.id, &failure.error);
        }
        output
    }

    fn header(&self) -> String {
        [
            "id",
            "criterion",
            "should_flatten",
            "min_index",
            "minimum",
            "sanity_passed",
            "result_value",
            "error",
        ]
        .join(",")
    }

    fn format_row(row: &CsvDecision) -> String {
        [
            row.id.to_string(),
            criterion_name(row.criterion).to_string(),
            row.should_flatten.to_string(),
            row.min_index.to_string(),
            row.minimum.to_string(),
            row.sanity_passed.map(|p| p.to_string()).unwrap_or_default(),
            optional(row.result_value),
            String::new(),
        ]
        .join(",")
    }

    /// Generate CSV output as string; failed records come last with only an error
    pub fn to_csv(&self) -> String {
        let mut output = String::new();

        output.push_str(&self.header());
        output.push('\n');

        for row in &self.rows {
            output.push_str(&Self::format_row(row));
            output.push('\n');
        }

        for (id, error) in &self.failures {
            output.push_str(&format!("{},,,,,,,{}\n", id, escape_field(error)));
        }

        output
    }
}

/// Long-format writer for flattened readings: `id,cycle,reading,replaced`
///
/// Writes the header before the first batch, or from [`CsvSeriesWriter::finish`]
/// when no batch was written.
pub struct CsvSeriesWriter<W: Write> {
    out: W,
    header_written: bool,
}

impl<W: Write> CsvSeriesWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            header_written: false,
        }
    }

    /// Write the header if nothing was written yet, flush, and hand back the writer
    pub fn finish(mut self) -> Result<W> {
        let mut header = String::new();
        self.push_header(&mut header);
        self.out
            .write_all(header.as_bytes())
            .context("Failed to write flattened series CSV")?;
        self.out.flush().context("Failed to flush flattened series CSV")?;
        Ok(self.out)
    }

    fn push_header(&mut self, chunk: &mut String) {
        if !self.header_written {
            chunk.push_str("id,cycle,reading,replaced\n");
            self.header_written = true;
        }
    }
}

impl<W: Write> FlattenSink for CsvSeriesWriter<W> {
    fn write_batch(&mut self, outcomes: &[RecordOutcome]) -> Result<()> {
        let mut chunk = String::new();
        self.push_header(&mut chunk);

        for outcome in outcomes {
            let Some(flattened) = &outcome.flattened else {
                continue;
            };
            for (cycle, reading) in flattened.readings.iter().enumerate() {
                let replaced = flattened.flattened && cycle < flattened.min_index;
                chunk.push_str(&format!("{},{},{},{}\n", outcome.id, cycle, reading, replaced));
            }
        }

        self.out
            .write_all(chunk.as_bytes())
            .context("Failed to write flattened series CSV")
    }
}

/// Comparison table formatter
#[derive(Debug)]
pub struct CsvComparisonOutput<'a> {
    report: &'a ComparisonReport,
}

impl<'a> CsvComparisonOutput<'a> {
    pub fn new(report: &'a ComparisonReport) -> Self {
        Self { report }
    }

    pub fn to_csv(&self) -> String {
        let mut output = String::from(
            "id,change,default_flatten,default_min_index,default_minimum,test_flatten,test_min_index,test_minimum\n",
        );

        for entry in &self.report.entries {
            let r = &entry.result;
            output.push_str(&format!(
                "{},{},{},{},{},{},{},{}\n",
                entry.id,
                escape_field(r.change.label()),
                r.default.should_flatten,
                r.default.min_index,
                r.default.cusum_min,
                r.test.should_flatten,
                r.test.min_index,
                r.test.cusum_min
            ));
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::FlattenDecision;
    use crate::flattener::FlattenedSeries;

    fn outcome(id: RecordId) -> RecordOutcome {
        RecordOutcome {
            id,
            decision: FlattenDecision {
                should_flatten: true,
                min_index: 2,
                cusum_min: -90.0,
                sanity: None,
                criterion: CriterionKind::Cusum,
                threshold: -80.0,
            },
            flattened: Some(FlattenedSeries {
                readings: vec![50.0, 50.0, 50.0, 80.0],
                flattened: true,
                min_index: 2,
                target_value: Some(50.0),
                noise_scale: 0.0,
                result_value: Some(60.0),
            }),
        }
    }

    #[test]
    fn test_escape_field() {
        assert_eq!(escape_field("simple"), "simple");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_decision_csv() {
        let mut output = CsvOutput::new();
        output.add_decision(CsvDecision {
            id: 12,
            criterion: CriterionKind::Cusum,
            should_flatten: true,
            min_index: 7,
            minimum: -95.5,
            sanity_passed: Some(true),
            result_value: Some(412.0),
        });
        output.add_failure(13, "invalid input: reading 2 is NaN");

        let csv = output.to_csv();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "id,criterion,should_flatten,min_index,minimum,sanity_passed,result_value,error"
        );
        assert_eq!(lines[1], "12,cusum,true,7,-95.5,true,412,");
        assert_eq!(lines[2], "13,,,,,,,invalid input: reading 2 is NaN");
    }

    #[test]
    fn test_series_writer_header_once() {
        let mut writer = CsvSeriesWriter::new(Vec::new());
        writer.write_batch(&[outcome(1)]).unwrap();
        writer.write_batch(&[outcome(2)]).unwrap();

        let csv = String::from_utf8(writer.finish().unwrap()).unwrap();
        assert_eq!(csv.matches("id,cycle,reading,replaced").count(), 1);
        assert!(csv.contains("1,0,50,true\n"));
        assert!(csv.contains("1,3,80,false\n"));
        assert_eq!(csv.lines().count(), 9);
    }

    #[test]
    fn test_series_writer_header_without_batches() {
        let writer = CsvSeriesWriter::new(Vec::new());
        let csv = String::from_utf8(writer.finish().unwrap()).unwrap();
        assert_eq!(csv, "id,cycle,reading,replaced\n");
    }
}
