//! Record sources: where batch runs get their readings
//!
//! The core only needs "record id → series". [`ReadingSource`] is that
//! contract; [`RecordSet`] is an in-memory implementation loaded from JSON,
//! which is what the CLI uses. A database-backed source implements the same
//! trait.

use crate::series::Series;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Record identifier as stored by the persistence layer
pub type RecordId = u64;

/// One stored amplification run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub readings: Vec<f64>,
    /// Precomputed standard deviation, if the store keeps one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std_dev: Option<f64>,
}

impl Record {
    pub fn new(id: RecordId, readings: Vec<f64>) -> Self {
        Self {
            id,
            readings,
            std_dev: None,
        }
    }

    pub fn series(&self) -> Series {
        let series = Series::new(self.readings.clone());
        match self.std_dev {
            Some(std_dev) => series.with_std_dev(std_dev),
            None => series,
        }
    }
}

/// Resolves record identifiers to reading series
pub trait ReadingSource: Sync {
    /// All ids the source can serve
    fn record_ids(&self) -> Vec<RecordId>;

    /// `None` if the id is unknown
    fn series(&self, id: RecordId) -> Option<Series>;
}

/// In-memory record collection keyed by id
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    records: BTreeMap<RecordId, Record>,
}

impl RecordSet {
    /// Build from records; a later duplicate id replaces an earlier one
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.id, r)).collect(),
        }
    }

    /// Parse a JSON array of `{ "id", "readings", "std_dev"? }` objects
    pub fn from_json_str(json: &str) -> Result<Self> {
        let records: Vec<Record> =
            serde_json::from_str(json).context("Failed to parse record set JSON")?;
        Ok(Self::from_records(records))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read record set {}", path.display()))?;
        Self::from_json_str(&json).with_context(|| format!("Invalid record set {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.records.get(&id)
    }
}

impl ReadingSource for RecordSet {
    fn record_ids(&self) -> Vec<RecordId> {
        self.records.keys().copied().collect()
    }

    fn series(&self, id: RecordId) -> Option<Series> {
        self.records.get(&id).map(Record::series)
    }
}

/// Order in which records are processed and reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Ascending id
    #[default]
    Up,
    /// Descending id
    Down,
}

/// What records are ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Record id, known before evaluation
    #[default]
    Id,
    /// CUSUM minimum, known only after evaluation
    Cusum,
}

/// Which records a batch run covers
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordSelection {
    /// Explicit ids; `None` selects every record in the source
    pub ids: Option<Vec<RecordId>>,
    pub sort_by: SortKey,
    pub order: SortOrder,
    pub limit: Option<usize>,
}

impl RecordSelection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn ids(ids: Vec<RecordId>) -> Self {
        Self {
            ids: Some(ids),
            ..Self::default()
        }
    }

    /// Resolve against a source: dedupe, sort, then limit
    ///
    /// Explicit ids are kept even if the source does not know them, so the
    /// batch can report them as failures. Under [`SortKey::Cusum`] every id
    /// is returned in ascending order; ordering and the limit are applied
    /// after evaluation by [`RecordSelection::arrange`].
    pub fn resolve(&self, source: &dyn ReadingSource) -> Vec<RecordId> {
        let mut ids = match &self.ids {
            Some(ids) => ids.clone(),
            None => source.record_ids(),
        };

        ids.sort_unstable();
        ids.dedup();
        if self.sort_by == SortKey::Cusum {
            return ids;
        }
        if self.order == SortOrder::Down {
            ids.reverse();
        }
        if let Some(limit) = self.limit {
            ids.truncate(limit);
        }

        ids
    }

    /// Order evaluated items by CUSUM minimum and apply the limit
    ///
    /// `Up` puts the deepest minimum first. Ties keep ascending id order.
    /// A no-op under [`SortKey::Id`], where `resolve` already did both.
    pub fn arrange<T>(&self, items: &mut Vec<T>, cusum_min: impl Fn(&T) -> f64) {
        if self.sort_by != SortKey::Cusum {
            return;
        }

        items.sort_by(|a, b| {
            let ord = cusum_min(a).total_cmp(&cusum_min(b));
            match self.order {
                SortOrder::Up => ord,
                SortOrder::Down => ord.reverse(),
            }
        });
        if let Some(limit) = self.limit {
            items.truncate(limit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_set() -> RecordSet {
        RecordSet::from_records(vec![
            Record::new(30, vec![1.0, 2.0]),
            Record::new(10, vec![3.0, 4.0]),
            Record::new(20, vec![5.0, 6.0]),
        ])
    }

    #[test]
    fn test_from_json() {
        let set = RecordSet::from_json_str(
            r#"[{"id": 7, "readings": [1.0, 2.5]}, {"id": 8, "readings": [3.0], "std_dev": 0.5}]"#,
        )
        .unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.series(7).unwrap().readings(), &[1.0, 2.5]);
        assert_eq!(set.series(8).unwrap().std_dev().unwrap(), 0.5);
        assert!(set.series(9).is_none());
    }

    #[test]
    fn test_from_json_invalid() {
        assert!(RecordSet::from_json_str("{not json").is_err());
    }

    #[test]
    fn test_select_all_ascending() {
        let set = sample_set();
        assert_eq!(RecordSelection::all().resolve(&set), vec![10, 20, 30]);
    }

    #[test]
    fn test_select_descending_with_limit() {
        let set = sample_set();
        let selection = RecordSelection {
            ids: None,
            order: SortOrder::Down,
            limit: Some(2),
            ..RecordSelection::default()
        };
        assert_eq!(selection.resolve(&set), vec![30, 20]);
    }

    #[test]
    fn test_cusum_key_defers_order_and_limit() {
        let set = sample_set();
        let selection = RecordSelection {
            sort_by: SortKey::Cusum,
            order: SortOrder::Down,
            limit: Some(1),
            ..RecordSelection::default()
        };
        assert_eq!(selection.resolve(&set), vec![10, 20, 30]);

        let mut minima = vec![(10, -5.0), (20, -90.0), (30, -5.0)];
        selection.arrange(&mut minima, |&(_, m)| m);
        assert_eq!(minima, vec![(10, -5.0)]);
    }

    #[test]
    fn test_arrange_ascending_puts_deepest_first() {
        let selection = RecordSelection {
            sort_by: SortKey::Cusum,
            ..RecordSelection::default()
        };
        let mut minima = vec![(10, -5.0), (20, -90.0), (30, 0.0)];
        selection.arrange(&mut minima, |&(_, m)| m);
        assert_eq!(minima, vec![(20, -90.0), (10, -5.0), (30, 0.0)]);
    }

    #[test]
    fn test_arrange_is_noop_for_id_key() {
        let mut minima = vec![(30, -1.0), (10, -9.0)];
        RecordSelection::all().arrange(&mut minima, |&(_, m)| m);
        assert_eq!(minima, vec![(30, -1.0), (10, -9.0)]);
    }

    #[test]
    fn test_select_explicit_ids_keeps_unknown() {
        let set = sample_set();
        let selection = RecordSelection::ids(vec![20, 99, 20, 10]);
        assert_eq!(selection.resolve(&set), vec![10, 20, 99]);
    }
}
