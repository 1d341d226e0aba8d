//! SQLite-backed partition store

use crate::data::SamplingGrain;
use crate::error::{AnalyticsError, Result};
use crate::snapshot::{PartitionKey, SnapshotPartition, SnapshotRecord};
use crate::storage::{validate_snapshot, PartitionStore};
use crate::types::Provenance;
use chrono::NaiveDate;
use rusqlite::{params, Connection, Transaction};
use std::path::Path;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Snapshot partitions in a `snapshot_records` table
pub struct SqlitePartitionStore {
    conn: Connection,
}

/// Row as stored, before text columns are parsed
struct RawRecord {
    snapshot_date: String,
    entity_id: String,
    period_date: String,
    category: String,
    grain: String,
    avg_value: f64,
    avg_volume: Option<f64>,
    provenance: String,
    quarter_avg_value: f64,
    forward: [Option<f64>; 4],
}

impl RawRecord {
    fn into_record(self) -> Result<SnapshotRecord> {
        let provenance = Provenance::parse(&self.provenance).ok_or_else(|| {
            AnalyticsError::StorageError(format!("Unknown provenance '{}'", self.provenance))
        })?;
        Ok(SnapshotRecord {
            snapshot_date: parse_date(&self.snapshot_date)?,
            entity_id: self.entity_id,
            period_date: parse_date(&self.period_date)?,
            category: self.category,
            grain: SamplingGrain::parse(&self.grain)?,
            avg_value: self.avg_value,
            avg_volume: self.avg_volume,
            provenance,
            quarter_avg_value: self.quarter_avg_value,
            forward_q1_return: self.forward[0],
            forward_q2_return: self.forward[1],
            forward_q3_return: self.forward[2],
            forward_q4_return: self.forward[3],
        })
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|e| AnalyticsError::StorageError(format!("Invalid stored date '{}': {}", s, e)))
}

fn storage_err(context: &str) -> impl Fn(rusqlite::Error) -> AnalyticsError + '_ {
    move |e| AnalyticsError::StorageError(format!("{}: {}", context, e))
}

impl SqlitePartitionStore {
    /// Create or open a database at path
    pub fn new(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path).map_err(storage_err("Failed to open database"))?;
        let store = Self { conn };
        store.create_tables()?;
        Ok(store)
    }

    /// Create in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(storage_err("Failed to create in-memory database"))?;
        let store = Self { conn };
        store.create_tables()?;
        Ok(store)
    }

    fn create_tables(&self) -> Result<()> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS snapshot_records (
                    snapshot_date TEXT NOT NULL,
                    entity_id TEXT NOT NULL,
                    period_date TEXT NOT NULL,
                    category TEXT NOT NULL,
                    grain TEXT NOT NULL,
                    avg_value REAL NOT NULL,
                    avg_volume REAL,
                    provenance TEXT NOT NULL,
                    quarter_avg_value REAL NOT NULL,
                    forward_q1_return REAL,
                    forward_q2_return REAL,
                    forward_q3_return REAL,
                    forward_q4_return REAL,
                    PRIMARY KEY (snapshot_date, entity_id, period_date)
                )",
                [],
            )
            .map_err(storage_err("Failed to create snapshot_records table"))?;
        Ok(())
    }

    fn delete_partition_tx(tx: &Transaction<'_>, key: &PartitionKey) -> Result<usize> {
        tx.execute(
            "DELETE FROM snapshot_records WHERE snapshot_date = ?1 AND entity_id = ?2",
            params![key.snapshot_date.to_string(), &key.entity_id],
        )
        .map_err(storage_err("Failed to delete partition"))
    }

    fn insert_rows_tx(tx: &Transaction<'_>, rows: &[SnapshotRecord]) -> Result<()> {
        let mut stmt = tx
            .prepare_cached(
                "INSERT INTO snapshot_records (snapshot_date, entity_id, period_date, category, grain,
                    avg_value, avg_volume, provenance, quarter_avg_value,
                    forward_q1_return, forward_q2_return, forward_q3_return, forward_q4_return)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )
            .map_err(storage_err("Failed to prepare insert"))?;

        for row in rows {
            stmt.execute(params![
                row.snapshot_date.to_string(),
                &row.entity_id,
                row.period_date.to_string(),
                &row.category,
                row.grain.as_str(),
                row.avg_value,
                row.avg_volume,
                row.provenance.as_str(),
                row.quarter_avg_value,
                row.forward_q1_return,
                row.forward_q2_return,
                row.forward_q3_return,
                row.forward_q4_return,
            ])
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    AnalyticsError::DuplicateKey {
                        snapshot_date: row.snapshot_date,
                        entity_id: row.entity_id.clone(),
                        period_date: row.period_date,
                    }
                }
                other => AnalyticsError::StorageError(format!("Failed to insert row: {}", other)),
            })?;
        }
        Ok(())
    }
}

impl PartitionStore for SqlitePartitionStore {
    fn replace_partition(&mut self, partition: SnapshotPartition) -> Result<()> {
        partition.validate()?;
        let tx = self.conn.transaction().map_err(storage_err("Failed to begin transaction"))?;
        Self::delete_partition_tx(&tx, &partition.key)?;
        Self::insert_rows_tx(&tx, &partition.rows)?;
        tx.commit().map_err(storage_err("Failed to commit partition"))
    }

    fn replace_snapshot(&mut self, snapshot_date: NaiveDate, partitions: Vec<SnapshotPartition>) -> Result<()> {
        validate_snapshot(snapshot_date, &partitions)?;
        let tx = self.conn.transaction().map_err(storage_err("Failed to begin transaction"))?;
        tx.execute(
            "DELETE FROM snapshot_records WHERE snapshot_date = ?1",
            params![snapshot_date.to_string()],
        )
        .map_err(storage_err("Failed to delete snapshot"))?;
        for partition in &partitions {
            Self::insert_rows_tx(&tx, &partition.rows)?;
        }
        tx.commit().map_err(storage_err("Failed to commit snapshot"))
    }

    fn delete_snapshot(&mut self, snapshot_date: NaiveDate) -> Result<usize> {
        self.conn
            .execute(
                "DELETE FROM snapshot_records WHERE snapshot_date = ?1",
                params![snapshot_date.to_string()],
            )
            .map_err(storage_err("Failed to delete snapshot"))
    }

    fn snapshot_rows(&self, snapshot_date: NaiveDate) -> Result<Vec<SnapshotRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT snapshot_date, entity_id, period_date, category, grain,
                        avg_value, avg_volume, provenance, quarter_avg_value,
                        forward_q1_return, forward_q2_return, forward_q3_return, forward_q4_return
                 FROM snapshot_records WHERE snapshot_date = ?1
                 ORDER BY entity_id, period_date",
            )
            .map_err(storage_err("Failed to prepare query"))?;

        let raw = stmt
            .query_map(params![snapshot_date.to_string()], |row| {
                Ok(RawRecord {
                    snapshot_date: row.get(0)?,
                    entity_id: row.get(1)?,
                    period_date: row.get(2)?,
                    category: row.get(3)?,
                    grain: row.get(4)?,
                    avg_value: row.get(5)?,
                    avg_volume: row.get(6)?,
                    provenance: row.get(7)?,
                    quarter_avg_value: row.get(8)?,
                    forward: [row.get(9)?, row.get(10)?, row.get(11)?, row.get(12)?],
                })
            })
            .map_err(storage_err("Failed to query snapshot"))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(storage_err("Failed to read snapshot row"))?;

        raw.into_iter().map(RawRecord::into_record).collect()
    }

    fn partition_keys(&self) -> Result<Vec<PartitionKey>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT DISTINCT snapshot_date, entity_id FROM snapshot_records
                 ORDER BY snapshot_date, entity_id",
            )
            .map_err(storage_err("Failed to prepare query"))?;

        let raw = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(storage_err("Failed to query partitions"))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(storage_err("Failed to read partition key"))?;

        raw.into_iter()
            .map(|(date, entity_id)| {
                Ok(PartitionKey {
                    snapshot_date: parse_date(&date)?,
                    entity_id,
                })
            })
            .collect()
    }
}
