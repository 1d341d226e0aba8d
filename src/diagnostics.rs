//! Forward-return audit
//!
//! A `0.00` forward return is a legitimate value, distinct from a null. The
//! audit flags structural defects in produced rows as errors and raises a
//! warning when an entity reports exact zeros suspiciously often, which
//! usually means a flat-filled input series.

use crate::calendar::{YearMonth, YearQuarter};
use crate::config::AnalyticsConfig;
use crate::pipeline::engine::PipelineOutput;
use crate::snapshot::{SnapshotPartition, SnapshotRecord};
use crate::types::{EntityId, Horizon};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Minimum non-null returns before the zero ratio is judged
const MIN_ZERO_SAMPLE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnomalyType {
    /// Month rows of one quarter report different forward returns
    InconsistentQuarter { quarter: YearQuarter },
    /// A return is present although the quarter it looks ahead to is not
    ReturnWithoutForwardQuarter { quarter: YearQuarter, horizon: Horizon },
    /// Too many exact-zero returns
    ExcessZeroReturns { zero_count: usize, total: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub snapshot_date: Option<NaiveDate>,
    pub entity_id: EntityId,
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
}

/// Checks forward-return columns of produced rows
#[derive(Debug, Clone, Copy)]
pub struct ForwardReturnAudit {
    zero_warn_ratio: f64,
}

impl ForwardReturnAudit {
    pub fn new(config: &AnalyticsConfig) -> Self {
        Self {
            zero_warn_ratio: config.zero_return_warn_ratio,
        }
    }

    /// Audit a pipeline run through its month rows
    pub fn audit_output(&self, output: &PipelineOutput) -> Vec<AnomalyReport> {
        let Some(as_of) = output.as_of else {
            return Vec::new();
        };
        let mut reports = Vec::new();
        for entity in &output.entities {
            let partition = SnapshotPartition::from_entity(as_of, entity);
            reports.extend(self.check_rows(None, &entity.entity_id, &partition.rows));
        }
        reports
    }

    /// Audit stored snapshot rows, grouped by `(snapshot_date, entity_id)`
    pub fn audit_records(&self, rows: &[SnapshotRecord]) -> Vec<AnomalyReport> {
        let mut groups: BTreeMap<(NaiveDate, &str), Vec<SnapshotRecord>> = BTreeMap::new();
        for row in rows {
            groups
                .entry((row.snapshot_date, row.entity_id.as_str()))
                .or_default()
                .push(row.clone());
        }

        let mut reports = Vec::new();
        for ((snapshot_date, entity_id), group) in groups {
            reports.extend(self.check_rows(Some(snapshot_date), entity_id, &group));
        }
        reports
    }

    fn check_rows(
        &self,
        snapshot_date: Option<NaiveDate>,
        entity_id: &str,
        rows: &[SnapshotRecord],
    ) -> Vec<AnomalyReport> {
        let report = |anomaly_type, severity| AnomalyReport {
            snapshot_date,
            entity_id: entity_id.to_string(),
            anomaly_type,
            severity,
        };

        let mut by_quarter: BTreeMap<YearQuarter, Vec<&SnapshotRecord>> = BTreeMap::new();
        for row in rows {
            by_quarter
                .entry(YearMonth::of(row.period_date).quarter())
                .or_default()
                .push(row);
        }

        let mut reports = Vec::new();
        let mut zero_count = 0;
        let mut total = 0;
        for (&quarter, months) in &by_quarter {
            let first = months[0];
            let consistent = months.iter().all(|m| {
                Horizon::ALL
                    .iter()
                    .all(|&h| m.forward_return(h) == first.forward_return(h))
            });
            if !consistent {
                reports.push(report(AnomalyType::InconsistentQuarter { quarter }, Severity::Error));
            }

            for horizon in Horizon::ALL {
                let Some(ret) = first.forward_return(horizon) else {
                    continue;
                };
                total += 1;
                if ret == 0.0 {
                    zero_count += 1;
                }
                let target = quarter.add_quarters(horizon.quarters() as i64);
                if !by_quarter.contains_key(&target) {
                    reports.push(report(
                        AnomalyType::ReturnWithoutForwardQuarter { quarter, horizon },
                        Severity::Error,
                    ));
                }
            }
        }

        if total >= MIN_ZERO_SAMPLE && zero_count as f64 / total as f64 > self.zero_warn_ratio {
            log::warn!(
                "{}: {} of {} forward returns are exactly zero",
                entity_id,
                zero_count,
                total
            );
            reports.push(report(
                AnomalyType::ExcessZeroReturns { zero_count, total },
                Severity::Warning,
            ));
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Dataset, SamplingGrain};
    use crate::pipeline::engine::PipelineEngine;
    use crate::types::{Provenance, TimeSeriesPoint};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn row(month: u32, q1: Option<f64>) -> SnapshotRecord {
        SnapshotRecord {
            snapshot_date: date(2024, 12, 31),
            entity_id: "SPY".to_string(),
            period_date: date(2024, month, 1),
            category: "equity".to_string(),
            grain: SamplingGrain::Monthly,
            avg_value: 100.0,
            avg_volume: None,
            provenance: Provenance::Actual,
            quarter_avg_value: 100.0,
            forward_q1_return: q1,
            forward_q2_return: None,
            forward_q3_return: None,
            forward_q4_return: None,
        }
    }

    fn audit() -> ForwardReturnAudit {
        ForwardReturnAudit::new(&AnalyticsConfig::default())
    }

    #[test]
    fn test_clean_pipeline_output() {
        let points: Vec<TimeSeriesPoint> = (1..=12)
            .map(|m| TimeSeriesPoint::new("SPY", date(2024, m, 5), 100.0 + m as f64, "equity"))
            .collect();
        let dataset = Dataset::from_points(points).unwrap();
        let output = PipelineEngine::new(AnalyticsConfig::default()).unwrap().run(&dataset);
        assert!(audit().audit_output(&output).is_empty());
    }

    #[test]
    fn test_inconsistent_quarter_flagged() {
        let rows = vec![row(1, Some(1.0)), row(2, Some(2.0)), row(4, None)];
        let reports = audit().audit_records(&rows);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].severity, Severity::Error);
        assert!(matches!(reports[0].anomaly_type, AnomalyType::InconsistentQuarter { .. }));
    }

    #[test]
    fn test_return_without_forward_quarter() {
        let rows = vec![row(1, Some(5.0))];
        let reports = audit().audit_records(&rows);
        assert_eq!(
            reports[0].anomaly_type,
            AnomalyType::ReturnWithoutForwardQuarter {
                quarter: YearQuarter::new(2024, 1).unwrap(),
                horizon: Horizon::Q1,
            }
        );
    }

    #[test]
    fn test_zero_returns_warn_only_above_ratio() {
        // three non-null returns is below the minimum sample
        let rows = vec![row(1, Some(0.0)), row(4, Some(0.0)), row(7, Some(0.0)), row(10, None)];
        assert!(audit().audit_records(&rows).is_empty());

        let rows = vec![row(1, Some(0.0)), row(4, Some(0.0)), row(7, Some(0.0)), row(10, Some(0.0))];
        let reports = audit().audit_records(&rows);
        assert!(reports.iter().any(|r| r.severity == Severity::Warning
            && r.anomaly_type == AnomalyType::ExcessZeroReturns { zero_count: 4, total: 4 }));

        let rows = vec![row(1, Some(0.0)), row(4, Some(1.5)), row(7, Some(0.0)), row(10, Some(2.0))];
        assert!(audit()
            .audit_records(&rows)
            .iter()
            .all(|r| r.severity == Severity::Error));
    }
}
