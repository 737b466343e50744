//! Run history: the per-tick records of every bucket, joined by tick.

use std::collections::BTreeMap;

use serde::Serialize;
use tickflow_core::{Error, Result, Tick};

use crate::record::TickRecord;

/// One bucket's record series.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Column {
    /// Bucket name.
    pub name: String,
    /// Records keyed by tick.
    pub records: BTreeMap<Tick, TickRecord>,
}

/// One row of the joined history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryRow<'a> {
    /// The tick.
    pub tick: Tick,
    /// Each bucket's record at this tick, absent if it recorded nothing.
    #[serde(flatten)]
    pub records: BTreeMap<&'a str, &'a TickRecord>,
}

/// Per-tick observations of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    columns: Vec<Column>,
    ticks: Vec<Tick>,
}

impl History {
    /// Creates a history from bucket columns (in chain order) and the ticks
    /// the run visited.
    #[must_use]
    pub fn new(columns: Vec<Column>, ticks: Vec<Tick>) -> Self {
        Self { columns, ticks }
    }

    /// Ticks visited by the run, in order.
    #[must_use]
    pub fn ticks(&self) -> &[Tick] {
        &self.ticks
    }

    /// Bucket names in chain order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Every column, in chain order.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// One bucket's record series.
    ///
    /// # Errors
    ///
    /// Returns `Error::BucketNotFound` for an unknown name.
    pub fn column(&self, name: &str) -> Result<&BTreeMap<Tick, TickRecord>> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.records)
            .ok_or_else(|| Error::BucketNotFound {
                name: name.to_string(),
            })
    }

    /// One bucket's record at one tick.
    #[must_use]
    pub fn record(&self, name: &str, tick: Tick) -> Option<&TickRecord> {
        self.column(name).ok()?.get(&tick)
    }

    /// Ticks at which `name` moved at least one token.
    #[must_use]
    pub fn activations(&self, name: &str) -> Vec<Tick> {
        self.column(name)
            .map(|records| {
                records
                    .iter()
                    .filter(|(_, r)| r.moved > 0)
                    .map(|(tick, _)| *tick)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Total tokens resident across all buckets after `tick`.
    ///
    /// Buckets with no record at `tick` are skipped.
    #[must_use]
    pub fn total_size_at(&self, tick: Tick) -> u64 {
        self.columns
            .iter()
            .filter_map(|c| c.records.get(&tick))
            .map(|r| r.size)
            .sum()
    }

    /// The outer join of every column on tick, in ascending tick order.
    #[must_use]
    pub fn rows(&self) -> Vec<HistoryRow<'_>> {
        let mut rows: BTreeMap<Tick, HistoryRow<'_>> = BTreeMap::new();
        for column in &self.columns {
            for (tick, record) in &column.records {
                rows.entry(*tick)
                    .or_insert_with(|| HistoryRow {
                        tick: *tick,
                        records: BTreeMap::new(),
                    })
                    .records
                    .insert(column.name.as_str(), record);
            }
        }
        rows.into_values().collect()
    }

    /// Serializes the joined rows as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.rows())
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }
}
