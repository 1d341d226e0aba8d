//! Point-in-time snapshot engine
//!
//! For each anchor date the pipeline is replayed over the points dated on or
//! before the anchor. The truncation happens before any computation, so a
//! snapshot is a pure function of the history visible at its anchor and is
//! unchanged by points added later.

use crate::analysis::{CorrelationAnalyzer, CorrelationReport};
use crate::calendar::YearMonth;
use crate::config::AnalyticsConfig;
use crate::data::{Dataset, SamplingGrain};
use crate::error::{AnalyticsError, Result};
use crate::pipeline::engine::{EntityOutput, PipelineEngine, PipelineOutput};
use crate::pipeline::factors_returns::{BacktestReturns, RealizedReturnCalculator};
use crate::storage::PartitionStore;
use crate::types::{EntityId, Horizon, Pct, Provenance, Quantity, Value};
use chrono::NaiveDate;
use hashbrown::HashSet;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Partition id: one entity within one snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey {
    pub snapshot_date: NaiveDate,
    pub entity_id: EntityId,
}

/// Output relation row: what the pipeline computed for one month as of the snapshot date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub snapshot_date: NaiveDate,
    pub entity_id: EntityId,
    pub period_date: NaiveDate,
    pub category: String,
    pub grain: SamplingGrain,
    pub avg_value: Value,
    pub avg_volume: Option<Quantity>,
    pub provenance: Provenance,
    pub quarter_avg_value: Value,
    pub forward_q1_return: Option<Pct>,
    pub forward_q2_return: Option<Pct>,
    pub forward_q3_return: Option<Pct>,
    pub forward_q4_return: Option<Pct>,
}

impl SnapshotRecord {
    pub fn forward_return(&self, horizon: Horizon) -> Option<Pct> {
        match horizon {
            Horizon::Q1 => self.forward_q1_return,
            Horizon::Q2 => self.forward_q2_return,
            Horizon::Q3 => self.forward_q3_return,
            Horizon::Q4 => self.forward_q4_return,
        }
    }
}

/// All snapshot rows of one entity for one anchor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotPartition {
    pub key: PartitionKey,
    pub rows: Vec<SnapshotRecord>,
}

impl SnapshotPartition {
    /// Flatten an entity's month rows under a snapshot date
    pub fn from_entity(snapshot_date: NaiveDate, entity: &EntityOutput) -> Self {
        let rows = entity
            .months
            .iter()
            .map(|row| SnapshotRecord {
                snapshot_date,
                entity_id: entity.entity_id.clone(),
                period_date: row.month().first_day(),
                category: entity.category.clone(),
                grain: entity.grain,
                avg_value: row.value.avg_value,
                avg_volume: row.value.avg_volume,
                provenance: row.value.provenance,
                quarter_avg_value: row.quarter.avg_value,
                forward_q1_return: row.quarter.get(Horizon::Q1),
                forward_q2_return: row.quarter.get(Horizon::Q2),
                forward_q3_return: row.quarter.get(Horizon::Q3),
                forward_q4_return: row.quarter.get(Horizon::Q4),
            })
            .collect();

        Self {
            key: PartitionKey {
                snapshot_date,
                entity_id: entity.entity_id.clone(),
            },
            rows,
        }
    }

    /// Check every row belongs to the key and `(snapshot_date, entity_id, period_date)` is unique
    pub fn validate(&self) -> Result<()> {
        let mut periods = HashSet::with_capacity(self.rows.len());
        for row in &self.rows {
            if row.snapshot_date != self.key.snapshot_date || row.entity_id != self.key.entity_id {
                return Err(AnalyticsError::StorageError(format!(
                    "row ({}, {}) does not belong to partition ({}, {})",
                    row.snapshot_date, row.entity_id, self.key.snapshot_date, self.key.entity_id
                )));
            }
            if !periods.insert(row.period_date) {
                return Err(AnalyticsError::DuplicateKey {
                    snapshot_date: row.snapshot_date,
                    entity_id: row.entity_id.clone(),
                    period_date: row.period_date,
                });
            }
        }
        Ok(())
    }
}

/// Correlation analysis as of an anchor date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationSnapshot {
    pub snapshot_date: NaiveDate,
    pub report: CorrelationReport,
}

/// Counts from a persisted snapshot run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRunSummary {
    pub anchors: usize,
    pub partitions: usize,
    pub rows: usize,
}

/// Replays the pipeline per anchor date
#[derive(Debug, Clone)]
pub struct SnapshotEngine {
    pipeline: PipelineEngine,
    analyzer: CorrelationAnalyzer,
}

impl SnapshotEngine {
    pub fn new(config: AnalyticsConfig) -> Result<Self> {
        let analyzer = CorrelationAnalyzer::new(&config)?;
        Ok(Self {
            pipeline: PipelineEngine::new(config)?,
            analyzer,
        })
    }

    pub fn config(&self) -> &AnalyticsConfig {
        self.pipeline.config()
    }

    /// Pipeline output using only data visible at `anchor`
    pub fn pipeline_as_of(&self, dataset: &Dataset, anchor: NaiveDate) -> PipelineOutput {
        self.pipeline.run_as_of(dataset, anchor)
    }

    /// Snapshot partitions for one anchor, ordered by entity
    pub fn compute(&self, dataset: &Dataset, anchor: NaiveDate) -> Vec<SnapshotPartition> {
        let output = self.pipeline_as_of(dataset, anchor);
        output
            .entities
            .iter()
            .map(|entity| SnapshotPartition::from_entity(anchor, entity))
            .collect()
    }

    /// Snapshot partitions for many anchors; anchors are independent
    pub fn compute_all(
        &self,
        dataset: &Dataset,
        anchors: &[NaiveDate],
    ) -> Vec<(NaiveDate, Vec<SnapshotPartition>)> {
        if self.config().parallel {
            anchors
                .par_iter()
                .map(|&anchor| (anchor, self.compute(dataset, anchor)))
                .collect()
        } else {
            anchors
                .iter()
                .map(|&anchor| (anchor, self.compute(dataset, anchor)))
                .collect()
        }
    }

    /// Correlation analysis over the data visible at `anchor`
    pub fn correlation_snapshot(&self, dataset: &Dataset, anchor: NaiveDate) -> CorrelationSnapshot {
        let output = self.pipeline_as_of(dataset, anchor);
        CorrelationSnapshot {
            snapshot_date: anchor,
            report: self.analyzer.analyze_output(&output, self.config().change_window),
        }
    }

    /// Correlation snapshots for many anchors
    pub fn correlation_snapshots(&self, dataset: &Dataset, anchors: &[NaiveDate]) -> Vec<CorrelationSnapshot> {
        if self.config().parallel {
            anchors
                .par_iter()
                .map(|&anchor| self.correlation_snapshot(dataset, anchor))
                .collect()
        } else {
            anchors
                .iter()
                .map(|&anchor| self.correlation_snapshot(dataset, anchor))
                .collect()
        }
    }

    /// Realized returns of `symbols` from the month of `backtest_date`.
    ///
    /// Unlike the snapshots this reads history after `backtest_date`: it
    /// scores a call made then against what followed. Unknown symbols and a
    /// missing benchmark produce null returns.
    pub fn backtest_returns(
        &self,
        dataset: &Dataset,
        backtest_date: NaiveDate,
        symbols: &[&str],
    ) -> Vec<BacktestReturns> {
        let config = self.config();
        let output = self.pipeline.run(dataset);
        let levels = |entity_id: &str| {
            output
                .entity(entity_id)
                .map(|e| e.monthly_levels())
                .unwrap_or_default()
        };
        let benchmark = levels(&config.benchmark_entity);
        if benchmark.is_empty() {
            log::warn!("Benchmark {} has no monthly data", config.benchmark_entity);
        }

        let calculator = RealizedReturnCalculator::new(config.return_precision, config.backtest_periods.clone());
        let from = YearMonth::of(backtest_date);
        log::debug!("Scoring {} symbols from {}", symbols.len(), from);
        symbols
            .iter()
            .map(|&symbol| calculator.score(symbol, &levels(symbol), &config.benchmark_entity, &benchmark, from))
            .collect()
    }

    /// Compute and persist snapshots for every anchor
    pub fn run<S: PartitionStore>(
        &self,
        dataset: &Dataset,
        anchors: &[NaiveDate],
        store: &mut S,
    ) -> Result<SnapshotRunSummary> {
        self.run_with_progress(dataset, anchors, store, |_, _, _| {})
    }

    /// Compute and persist snapshots, reporting each persisted anchor.
    ///
    /// The callback receives the anchor, its index and the anchor count.
    /// Computation runs in parallel; writes happen on the caller's thread,
    /// each replacing the whole snapshot date.
    pub fn run_with_progress<S, F>(
        &self,
        dataset: &Dataset,
        anchors: &[NaiveDate],
        store: &mut S,
        progress: F,
    ) -> Result<SnapshotRunSummary>
    where
        S: PartitionStore,
        F: Fn(NaiveDate, usize, usize),
    {
        log::info!(
            "Computing {} snapshots over {} entities",
            anchors.len(),
            dataset.len()
        );

        let mut summary = SnapshotRunSummary::default();
        let total = anchors.len();
        for (idx, (anchor, partitions)) in self.compute_all(dataset, anchors).into_iter().enumerate() {
            for partition in &partitions {
                partition.validate()?;
            }
            let rows: usize = partitions.iter().map(|p| p.rows.len()).sum();
            log::debug!(
                "Replacing snapshot {}: {} partitions, {} rows",
                anchor,
                partitions.len(),
                rows
            );

            summary.anchors += 1;
            summary.partitions += partitions.len();
            summary.rows += rows;
            store.replace_snapshot(anchor, partitions)?;
            progress(anchor, idx, total);
        }

        log::info!(
            "Snapshot run complete: {} anchors, {} partitions, {} rows",
            summary.anchors,
            summary.partitions,
            summary.rows
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TimeSeriesPoint;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn two_quarter_dataset() -> Dataset {
        // Q1 averages 100, Q2 averages 110
        let mut points = Vec::new();
        for m in 1..=6 {
            let value = if m <= 3 { 100.0 } else { 110.0 };
            points.push(TimeSeriesPoint::new("SYM", date(2024, m, 10), value, "equity"));
        }
        Dataset::from_points(points).unwrap()
    }

    #[test]
    fn test_snapshot_hides_future_quarter() {
        let engine = SnapshotEngine::new(AnalyticsConfig::default()).unwrap();
        let dataset = two_quarter_dataset();

        let full = engine.compute(&dataset, date(2024, 6, 30));
        assert_eq!(full[0].rows[0].forward_q1_return, Some(10.0));

        let at_q1_end = engine.compute(&dataset, date(2024, 3, 31));
        assert_eq!(at_q1_end[0].rows.len(), 3);
        for row in &at_q1_end[0].rows {
            assert_eq!(row.forward_q1_return, None);
            assert_eq!(row.snapshot_date, date(2024, 3, 31));
        }
    }

    #[test]
    fn test_partition_validation() {
        let engine = SnapshotEngine::new(AnalyticsConfig::default()).unwrap();
        let mut partition = engine.compute(&two_quarter_dataset(), date(2024, 6, 30)).remove(0);
        assert!(partition.validate().is_ok());

        let duplicate = partition.rows[0].clone();
        partition.rows.push(duplicate);
        assert!(matches!(partition.validate(), Err(AnalyticsError::DuplicateKey { .. })));
    }

    #[test]
    fn test_compute_all_keeps_anchor_order() {
        let engine = SnapshotEngine::new(AnalyticsConfig::default()).unwrap();
        let anchors = vec![date(2024, 5, 1), date(2024, 2, 1), date(2024, 4, 1)];
        let results = engine.compute_all(&two_quarter_dataset(), &anchors);
        let order: Vec<NaiveDate> = results.iter().map(|(d, _)| *d).collect();
        assert_eq!(order, anchors);
    }

    #[test]
    fn test_anchor_before_any_data_is_empty() {
        let engine = SnapshotEngine::new(AnalyticsConfig::default()).unwrap();
        assert!(engine.compute(&two_quarter_dataset(), date(2023, 12, 31)).is_empty());
    }
}
