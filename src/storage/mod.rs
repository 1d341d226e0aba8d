//! Snapshot persistence
//!
//! Snapshots are stored as partitions keyed by `(snapshot_date, entity_id)`.
//! Every write replaces whole partitions, so re-running an anchor leaves the
//! store in the same state as running it once.

#[cfg(feature = "rusqlite-support")]
pub mod sqlite;

#[cfg(feature = "rusqlite-support")]
pub use sqlite::SqlitePartitionStore;

use crate::error::{AnalyticsError, Result};
use crate::snapshot::{PartitionKey, SnapshotPartition, SnapshotRecord};
use chrono::NaiveDate;
use hashbrown::HashSet;
use std::collections::BTreeMap;

/// Destination for snapshot partitions
pub trait PartitionStore {
    /// Replace one `(snapshot_date, entity_id)` partition
    fn replace_partition(&mut self, partition: SnapshotPartition) -> Result<()>;

    /// Replace every partition of a snapshot date with the given set.
    ///
    /// Entities absent from `partitions` are removed from the snapshot.
    fn replace_snapshot(&mut self, snapshot_date: NaiveDate, partitions: Vec<SnapshotPartition>) -> Result<()>;

    /// Delete a snapshot date, returning the number of rows removed
    fn delete_snapshot(&mut self, snapshot_date: NaiveDate) -> Result<usize>;

    /// Rows of a snapshot date ordered by entity then period
    fn snapshot_rows(&self, snapshot_date: NaiveDate) -> Result<Vec<SnapshotRecord>>;

    /// All stored partition keys, ordered
    fn partition_keys(&self) -> Result<Vec<PartitionKey>>;

    /// Stored snapshot dates, ordered
    fn snapshot_dates(&self) -> Result<Vec<NaiveDate>> {
        let mut dates: Vec<NaiveDate> = self.partition_keys()?.into_iter().map(|k| k.snapshot_date).collect();
        dates.dedup();
        Ok(dates)
    }
}

/// Check a replacement set before anything is deleted: every partition must
/// belong to `snapshot_date` and name each entity at most once
pub fn validate_snapshot(snapshot_date: NaiveDate, partitions: &[SnapshotPartition]) -> Result<()> {
    let mut entities = HashSet::with_capacity(partitions.len());
    for partition in partitions {
        if partition.key.snapshot_date != snapshot_date {
            return Err(AnalyticsError::StorageError(format!(
                "partition ({}, {}) cannot replace snapshot {}",
                partition.key.snapshot_date, partition.key.entity_id, snapshot_date
            )));
        }
        partition.validate()?;
        if !entities.insert(partition.key.entity_id.as_str()) {
            return Err(AnalyticsError::DuplicateKey {
                snapshot_date,
                entity_id: partition.key.entity_id.clone(),
                period_date: partition.rows.first().map_or(snapshot_date, |r| r.period_date),
            });
        }
    }
    Ok(())
}

/// In-memory partition arena
#[derive(Debug, Clone, Default)]
pub struct InMemoryPartitionStore {
    partitions: BTreeMap<PartitionKey, Vec<SnapshotRecord>>,
}

impl InMemoryPartitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partition(&self, key: &PartitionKey) -> Option<&[SnapshotRecord]> {
        self.partitions.get(key).map(|rows| rows.as_slice())
    }

    pub fn row_count(&self) -> usize {
        self.partitions.values().map(|rows| rows.len()).sum()
    }

    fn insert(&mut self, partition: SnapshotPartition) -> Result<()> {
        partition.validate()?;
        let mut rows = partition.rows;
        rows.sort_by_key(|r| r.period_date);
        self.partitions.insert(partition.key, rows);
        Ok(())
    }
}

impl PartitionStore for InMemoryPartitionStore {
    fn replace_partition(&mut self, partition: SnapshotPartition) -> Result<()> {
        self.insert(partition)
    }

    fn replace_snapshot(&mut self, snapshot_date: NaiveDate, partitions: Vec<SnapshotPartition>) -> Result<()> {
        validate_snapshot(snapshot_date, &partitions)?;
        self.delete_snapshot(snapshot_date)?;
        for partition in partitions {
            self.insert(partition)?;
        }
        Ok(())
    }

    fn delete_snapshot(&mut self, snapshot_date: NaiveDate) -> Result<usize> {
        let before = self.row_count();
        self.partitions.retain(|key, _| key.snapshot_date != snapshot_date);
        Ok(before - self.row_count())
    }

    fn snapshot_rows(&self, snapshot_date: NaiveDate) -> Result<Vec<SnapshotRecord>> {
        Ok(self
            .partitions
            .iter()
            .filter(|(key, _)| key.snapshot_date == snapshot_date)
            .flat_map(|(_, rows)| rows.iter().cloned())
            .collect())
    }

    fn partition_keys(&self) -> Result<Vec<PartitionKey>> {
        Ok(self.partitions.keys().cloned().collect())
    }
}
