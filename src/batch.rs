//! Batch processing over a record source
//!
//! Records are independent, so a batch is a parallel map: selected ids go
//! into a lock-free queue (crossbeam `ArrayQueue`) drained by scoped worker
//! threads. Results are put back into selection order before anything is
//! reported or written.
//!
//! A record that fails is logged with its id and listed in the report; the
//! rest of the batch carries on. Records shorter than `min_readings` are
//! skipped rather than failed.

use crate::comparison::{ComparisonFilter, ComparisonResult, DecisionChange, ParameterComparator};
use crate::detection::{decide, DetectionConfig, FlattenDecision};
use crate::flattener::{Flattener, FlattenedSeries};
use crate::records::{ReadingSource, RecordId, RecordSelection};
use crate::series::Series;
use anyhow::{anyhow, bail, Result};
use crossbeam::queue::ArrayQueue;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};

/// Records with fewer readings than this are skipped by default
pub const DEFAULT_MIN_READINGS: usize = 10;

/// Flattened records handed to a sink per write
pub const DEFAULT_SINK_BATCH_SIZE: usize = 1000;

/// Execution settings for a batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Worker threads; 0 uses the available parallelism
    pub workers: usize,
    pub min_readings: usize,
    pub sink_batch_size: usize,
    /// Base seed for flattening noise; `None` draws from OS entropy
    pub seed: Option<u64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            min_readings: DEFAULT_MIN_READINGS,
            sink_batch_size: DEFAULT_SINK_BATCH_SIZE,
            seed: None,
        }
    }
}

impl BatchConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.sink_batch_size == 0 {
            bail!("sink_batch_size must be at least 1");
        }
        Ok(())
    }

    fn effective_workers(&self, jobs: usize) -> usize {
        let workers = if self.workers == 0 {
            std::thread::available_parallelism().map_or(1, |n| n.get())
        } else {
            self.workers
        };
        workers.clamp(1, jobs.max(1))
    }

    /// Noise RNG for one record
    ///
    /// Seeded runs mix the record id into the base seed, so a record gets the
    /// same noise no matter which worker picks it up.
    pub fn rng_for(&self, id: RecordId) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ id.wrapping_mul(0x9E37_79B9_7F4A_7C15)),
            None => StdRng::from_entropy(),
        }
    }
}

/// Decision (and flattened readings, when applied) for one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordOutcome {
    pub id: RecordId,
    pub decision: FlattenDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flattened: Option<FlattenedSeries>,
}

impl RecordOutcome {
    /// Flattening was applied and replaced at least the decision's prefix
    pub fn was_flattened(&self) -> bool {
        self.flattened.as_ref().is_some_and(|f| f.flattened)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFailure {
    pub id: RecordId,
    pub error: String,
}

/// Per-record result of a worker task
enum Work<T> {
    Done(T),
    Skipped(RecordId),
    Failed(RecordFailure),
}

/// Result of a decide or flatten batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub outcomes: Vec<RecordOutcome>,
    pub skipped: Vec<RecordId>,
    pub failures: Vec<RecordFailure>,
    pub config: DetectionConfig,
}

impl BatchReport {
    pub fn processed(&self) -> usize {
        self.outcomes.len()
    }

    pub fn flatten_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.decision.should_flatten)
            .count()
    }

    pub fn sanity_rejections(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.decision.rejected_by_sanity())
            .count()
    }

    pub fn to_report_string(&self) -> String {
        let mut report = String::new();

        report.push_str(&format!(
            "CUSUM FLATTENING ({}, threshold {})\n\n",
            self.config.criterion.label(),
            self.config.threshold
        ));
        report.push_str(&format!("Records processed: {}\n", self.processed()));
        report.push_str(&format!("Flattened: {}\n", self.flatten_count()));
        report.push_str(&format!("Sanity rejections: {}\n", self.sanity_rejections()));
        report.push_str(&format!("Skipped (too short): {}\n", self.skipped.len()));
        report.push_str(&format!("Failed: {}\n", self.failures.len()));

        let flattened: Vec<&RecordOutcome> = self
            .outcomes
            .iter()
            .filter(|o| o.decision.should_flatten)
            .collect();
        if !flattened.is_empty() {
            report.push_str("\nFlattened records:\n");
            for outcome in flattened {
                report.push_str(&format!(
                    "  {:>8}  min_index {:>4}  minimum {:>10.3}\n",
                    outcome.id, outcome.decision.min_index, outcome.decision.cusum_min
                ));
            }
        }

        if !self.failures.is_empty() {
            report.push_str("\nFailed records:\n");
            for failure in &self.failures {
                report.push_str(&format!("  {:>8}  {}\n", failure.id, failure.error));
            }
        }

        report
    }
}

/// One record's comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonEntry {
    pub id: RecordId,
    pub result: ComparisonResult,
}

/// Result of a comparison batch
///
/// Counts cover every evaluated record; `entries` only those matching the
/// filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub description: String,
    pub filter: ComparisonFilter,
    pub evaluated: usize,
    pub newly_flattened: usize,
    pub no_longer_flattened: usize,
    pub entries: Vec<ComparisonEntry>,
    pub skipped: Vec<RecordId>,
    pub failures: Vec<RecordFailure>,
}

impl ComparisonReport {
    pub fn changes(&self) -> usize {
        self.newly_flattened + self.no_longer_flattened
    }

    pub fn to_report_string(&self) -> String {
        let mut report = String::new();

        report.push_str(&format!("PARAMETER COMPARISON: {}\n\n", self.description));
        report.push_str(&format!("Records evaluated: {}\n", self.evaluated));
        report.push_str(&format!(
            "{}: {}\n",
            DecisionChange::NoLongerFlattens.label(),
            self.no_longer_flattened
        ));
        report.push_str(&format!(
            "{}: {}\n",
            DecisionChange::NewlyFlattens.label(),
            self.newly_flattened
        ));
        report.push_str(&format!("Skipped (too short): {}\n", self.skipped.len()));
        report.push_str(&format!("Failed: {}\n", self.failures.len()));

        if !self.entries.is_empty() {
            report.push_str(&format!("\nRecords ({:?}):\n", self.filter));
            for entry in &self.entries {
                let r = &entry.result;
                report.push_str(&format!(
                    "  {:>8}  default {:>10.3} @ {:<4} test {:>10.3} @ {:<4} {}\n",
                    entry.id,
                    r.default.cusum_min,
                    r.default.min_index,
                    r.test.cusum_min,
                    r.test.min_index,
                    r.change.label()
                ));
            }
        }

        report
    }
}

/// Receives flattened records in batches
pub trait FlattenSink {
    fn write_batch(&mut self, outcomes: &[RecordOutcome]) -> Result<()>;
}

/// Collects everything in memory
impl FlattenSink for Vec<RecordOutcome> {
    fn write_batch(&mut self, outcomes: &[RecordOutcome]) -> Result<()> {
        self.extend_from_slice(outcomes);
        Ok(())
    }
}

/// Decide every selected record without flattening
pub fn run_decisions(
    source: &dyn ReadingSource,
    selection: &RecordSelection,
    config: &DetectionConfig,
    batch: &BatchConfig,
) -> Result<BatchReport> {
    run(source, selection, config, batch, false)
}

/// Decide and flatten every selected record
pub fn run_flatten(
    source: &dyn ReadingSource,
    selection: &RecordSelection,
    config: &DetectionConfig,
    batch: &BatchConfig,
) -> Result<BatchReport> {
    run(source, selection, config, batch, true)
}

fn run(
    source: &dyn ReadingSource,
    selection: &RecordSelection,
    config: &DetectionConfig,
    batch: &BatchConfig,
    apply: bool,
) -> Result<BatchReport> {
    config.validate()?;
    batch.validate()?;

    let ids = selection.resolve(source);
    let flattener = Flattener::new(config);

    let results = par_map(&ids, batch, |id| {
        with_series(source, id, batch, |series| {
            let decision = decide(series, config)?;
            let flattened = if apply {
                let mut rng = batch.rng_for(id);
                Some(flattener.flatten(series, &decision, &mut rng)?)
            } else {
                None
            };
            Ok(RecordOutcome {
                id,
                decision,
                flattened,
            })
        })
    })?;

    let (mut outcomes, skipped, failures) = partition(results);
    selection.arrange(&mut outcomes, |o| o.decision.cusum_min);
    let report = BatchReport {
        outcomes,
        skipped,
        failures,
        config: config.clone(),
    };

    tracing::info!(
        processed = report.processed(),
        flattened = report.flatten_count(),
        sanity_rejections = report.sanity_rejections(),
        skipped = report.skipped.len(),
        failed = report.failures.len(),
        "batch complete"
    );

    Ok(report)
}

/// Compare two configurations over every selected record
pub fn run_compare(
    source: &dyn ReadingSource,
    selection: &RecordSelection,
    comparator: &ParameterComparator,
    filter: ComparisonFilter,
    batch: &BatchConfig,
) -> Result<ComparisonReport> {
    batch.validate()?;

    let ids = selection.resolve(source);
    let results = par_map(&ids, batch, |id| {
        with_series(source, id, batch, |series| {
            Ok(ComparisonEntry {
                id,
                result: comparator.compare(series)?,
            })
        })
    })?;

    let (mut all, skipped, failures) = partition(results);
    selection.arrange(&mut all, |e| e.result.default.cusum_min);
    let count = |change: DecisionChange| all.iter().filter(|e| e.result.change == change).count();

    let report = ComparisonReport {
        description: comparator.describe(),
        filter,
        evaluated: all.len(),
        newly_flattened: count(DecisionChange::NewlyFlattens),
        no_longer_flattened: count(DecisionChange::NoLongerFlattens),
        entries: all
            .iter()
            .filter(|e| filter.matches(&e.result))
            .cloned()
            .collect(),
        skipped,
        failures,
    };

    tracing::info!(
        evaluated = report.evaluated,
        changes = report.changes(),
        reported = report.entries.len(),
        "comparison complete"
    );

    Ok(report)
}

/// Write flattened outcomes to `sink` in chunks of `batch_size`
///
/// Records the decision left alone are not written. Returns how many were.
pub fn write_flattened(
    report: &BatchReport,
    sink: &mut dyn FlattenSink,
    batch_size: usize,
) -> Result<usize> {
    if batch_size == 0 {
        bail!("sink batch size must be at least 1");
    }

    let flattened: Vec<RecordOutcome> = report
        .outcomes
        .iter()
        .filter(|o| o.was_flattened())
        .cloned()
        .collect();

    for chunk in flattened.chunks(batch_size) {
        sink.write_batch(chunk)?;
        tracing::debug!(records = chunk.len(), "sink batch written");
    }

    Ok(flattened.len())
}

/// Load a record, apply the length filter, run `task`, and log failures
fn with_series<T>(
    source: &dyn ReadingSource,
    id: RecordId,
    batch: &BatchConfig,
    task: impl FnOnce(&Series) -> crate::error::Result<T>,
) -> Work<T> {
    let Some(series) = source.series(id) else {
        tracing::warn!(record_id = id, "record not found");
        return Work::Failed(RecordFailure {
            id,
            error: "record not found".to_string(),
        });
    };

    if series.len() < batch.min_readings {
        tracing::debug!(record_id = id, readings = series.len(), "record skipped");
        return Work::Skipped(id);
    }

    match task(&series) {
        Ok(value) => Work::Done(value),
        Err(e) => {
            tracing::warn!(record_id = id, error = %e, "record failed");
            Work::Failed(RecordFailure {
                id,
                error: e.to_string(),
            })
        }
    }
}

/// Run `task` for every id on the worker pool; output is in input order
///
/// A task that panics fails only its own record.
fn par_map<T, F>(ids: &[RecordId], batch: &BatchConfig, task: F) -> Result<Vec<Work<T>>>
where
    T: Send,
    F: Fn(RecordId) -> Work<T> + Sync,
{
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let queue = ArrayQueue::new(ids.len());
    for job in ids.iter().copied().enumerate() {
        // Capacity equals the job count
        let _ = queue.push(job);
    }

    let workers = batch.effective_workers(ids.len());
    let per_worker = crossbeam::thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let queue = &queue;
                let task = &task;
                scope.spawn(move |_| {
                    let mut done = Vec::new();
                    while let Some((position, id)) = queue.pop() {
                        done.push((position, isolated(id, task)));
                    }
                    done
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| handle.join())
            .collect::<Vec<_>>()
    })
    .map_err(|_| anyhow!("batch worker panicked"))?;

    let mut merged = Vec::with_capacity(ids.len());
    for done in per_worker {
        merged.extend(done.map_err(|_| anyhow!("batch worker panicked"))?);
    }
    merged.sort_unstable_by_key(|(position, _)| *position);

    Ok(merged.into_iter().map(|(_, value)| value).collect())
}

/// Run one record's task, turning a panic into a failure for that record
fn isolated<T>(id: RecordId, task: &(impl Fn(RecordId) -> Work<T> + Sync)) -> Work<T> {
    match panic::catch_unwind(AssertUnwindSafe(|| task(id))) {
        Ok(work) => work,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(record_id = id, panic = %message, "record task panicked");
            Work::Failed(RecordFailure {
                id,
                error: format!("panicked: {}", message),
            })
        }
    }
}

fn partition<T>(results: Vec<Work<T>>) -> (Vec<T>, Vec<RecordId>, Vec<RecordFailure>) {
    let mut done = Vec::new();
    let mut skipped = Vec::new();
    let mut failures = Vec::new();

    for result in results {
        match result {
            Work::Done(value) => done.push(value),
            Work::Skipped(id) => skipped.push(id),
            Work::Failed(failure) => failures.push(failure),
        }
    }

    (done, skipped, failures)
}
