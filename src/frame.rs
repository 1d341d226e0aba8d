//! Tabular output via polars
//!
//! Each output relation converts to a `DataFrame` with its record field names
//! as columns. Nulls stay nulls: optional percentages become nullable `f64`
//! columns, never zeros.

use crate::analysis::{CorrelationReport, CorrelationResult, GrowthSpread, QuintileResult};
use crate::data::PeriodAggregate;
use crate::error::Result;
use crate::pipeline::factors_returns::{BacktestReturns, EconomicChange, ForwardReturnRecord};
use crate::snapshot::SnapshotRecord;
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

/// `num_days_from_ce` of 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

fn date_series(name: &str, dates: impl Iterator<Item = NaiveDate>) -> Result<Series> {
    let days: Vec<i32> = dates
        .map(|d| d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
        .collect();
    Ok(Series::new(name, days).cast(&DataType::Date)?)
}

fn str_series<'a>(name: &str, values: impl Iterator<Item = &'a str>) -> Series {
    Series::new(name, values.collect::<Vec<&str>>())
}

/// `PeriodAggregate` relation
pub fn aggregates_frame(rows: &[PeriodAggregate]) -> Result<DataFrame> {
    Ok(DataFrame::new(vec![
        str_series("entity_id", rows.iter().map(|r| r.entity_id.as_str())),
        date_series("period_date", rows.iter().map(|r| r.period_date))?,
        str_series("grain", rows.iter().map(|r| r.grain.as_str())),
        Series::new("avg_value", rows.iter().map(|r| r.avg_value).collect::<Vec<f64>>()),
        Series::new("avg_volume", rows.iter().map(|r| r.avg_volume).collect::<Vec<Option<f64>>>()),
        Series::new("sample_count", rows.iter().map(|r| r.sample_count).collect::<Vec<u32>>()),
        Series::new("filled_count", rows.iter().map(|r| r.filled_count).collect::<Vec<u32>>()),
    ])?)
}

/// `ForwardReturnRecord` relation
pub fn forward_returns_frame(rows: &[ForwardReturnRecord]) -> Result<DataFrame> {
    Ok(DataFrame::new(vec![
        str_series("entity_id", rows.iter().map(|r| r.entity_id.as_str())),
        date_series("period_date", rows.iter().map(|r| r.period_date))?,
        str_series("horizon", rows.iter().map(|r| r.horizon.as_str())),
        Series::new("pct_change", rows.iter().map(|r| r.pct_change).collect::<Vec<Option<f64>>>()),
    ])?)
}

/// `SnapshotRecord` relation
pub fn snapshot_frame(rows: &[SnapshotRecord]) -> Result<DataFrame> {
    let returns = |pick: fn(&SnapshotRecord) -> Option<f64>| -> Vec<Option<f64>> {
        rows.iter().map(pick).collect()
    };
    Ok(DataFrame::new(vec![
        date_series("snapshot_date", rows.iter().map(|r| r.snapshot_date))?,
        str_series("entity_id", rows.iter().map(|r| r.entity_id.as_str())),
        date_series("period_date", rows.iter().map(|r| r.period_date))?,
        str_series("category", rows.iter().map(|r| r.category.as_str())),
        str_series("grain", rows.iter().map(|r| r.grain.as_str())),
        Series::new("avg_value", rows.iter().map(|r| r.avg_value).collect::<Vec<f64>>()),
        Series::new("avg_volume", rows.iter().map(|r| r.avg_volume).collect::<Vec<Option<f64>>>()),
        str_series("provenance", rows.iter().map(|r| r.provenance.as_str())),
        Series::new(
            "quarter_avg_value",
            rows.iter().map(|r| r.quarter_avg_value).collect::<Vec<f64>>(),
        ),
        Series::new("forward_q1_return", returns(|r: &SnapshotRecord| r.forward_q1_return)),
        Series::new("forward_q2_return", returns(|r: &SnapshotRecord| r.forward_q2_return)),
        Series::new("forward_q3_return", returns(|r: &SnapshotRecord| r.forward_q3_return)),
        Series::new("forward_q4_return", returns(|r: &SnapshotRecord| r.forward_q4_return)),
    ])?)
}

/// Economic change rows, one `delta_<n>m_pct` column per configured window
pub fn economic_changes_frame(rows: &[EconomicChange]) -> Result<DataFrame> {
    let windows: Vec<u32> = rows
        .first()
        .map(|r| r.deltas.iter().map(|d| d.months).collect())
        .unwrap_or_default();

    let mut columns = vec![
        str_series("series_id", rows.iter().map(|r| r.series_id.as_str())),
        date_series("period_date", rows.iter().map(|r| r.period_date))?,
        Series::new("value", rows.iter().map(|r| r.value).collect::<Vec<f64>>()),
        str_series("provenance", rows.iter().map(|r| r.provenance.as_str())),
        Series::new("mom_pct", rows.iter().map(|r| r.mom_pct).collect::<Vec<Option<f64>>>()),
    ];
    for months in windows {
        let values: Vec<Option<f64>> = rows
            .iter()
            .map(|r| r.deltas.iter().find(|d| d.months == months).and_then(|d| d.pct))
            .collect();
        columns.push(Series::new(&format!("delta_{}m_pct", months), values));
    }
    Ok(DataFrame::new(columns)?)
}

pub fn correlations_frame(rows: &[CorrelationResult]) -> Result<DataFrame> {
    Ok(DataFrame::new(vec![
        str_series("entity_id", rows.iter().map(|r| r.entity_id.as_str())),
        str_series("series_id", rows.iter().map(|r| r.series_id.as_str())),
        str_series("horizon", rows.iter().map(|r| r.horizon.as_str())),
        Series::new(
            "correlation_coefficient",
            rows.iter().map(|r| r.correlation_coefficient).collect::<Vec<f64>>(),
        ),
        Series::new(
            "observation_count",
            rows.iter().map(|r| r.observation_count as u64).collect::<Vec<u64>>(),
        ),
    ])?)
}

pub fn quintiles_frame(rows: &[QuintileResult]) -> Result<DataFrame> {
    Ok(DataFrame::new(vec![
        str_series("entity_id", rows.iter().map(|r| r.entity_id.as_str())),
        str_series("series_id", rows.iter().map(|r| r.series_id.as_str())),
        str_series("horizon", rows.iter().map(|r| r.horizon.as_str())),
        Series::new("quintile", rows.iter().map(|r| r.quintile as u32).collect::<Vec<u32>>()),
        Series::new("mean_return", rows.iter().map(|r| r.mean_return).collect::<Vec<f64>>()),
        Series::new(
            "observation_count",
            rows.iter().map(|r| r.observation_count as u64).collect::<Vec<u64>>(),
        ),
    ])?)
}

pub fn spreads_frame(rows: &[GrowthSpread]) -> Result<DataFrame> {
    Ok(DataFrame::new(vec![
        str_series("entity_id", rows.iter().map(|r| r.entity_id.as_str())),
        str_series("series_id", rows.iter().map(|r| r.series_id.as_str())),
        str_series("horizon", rows.iter().map(|r| r.horizon.as_str())),
        Series::new("growing_mean", rows.iter().map(|r| r.growing_mean).collect::<Vec<f64>>()),
        Series::new("declining_mean", rows.iter().map(|r| r.declining_mean).collect::<Vec<f64>>()),
        Series::new("spread", rows.iter().map(|r| r.spread).collect::<Vec<f64>>()),
        Series::new(
            "observation_count",
            rows.iter().map(|r| r.observation_count as u64).collect::<Vec<u64>>(),
        ),
    ])?)
}

/// Realized backtest returns, one row per (entity, period)
pub fn backtest_returns_frame(rows: &[BacktestReturns]) -> Result<DataFrame> {
    let flat: Vec<_> = rows
        .iter()
        .flat_map(|row| row.returns.iter().map(move |r| (row, r)))
        .collect();
    Ok(DataFrame::new(vec![
        str_series("entity_id", flat.iter().map(|(row, _)| row.entity_id.as_str())),
        str_series("benchmark_id", flat.iter().map(|(row, _)| row.benchmark_id.as_str())),
        date_series("backtest_month", flat.iter().map(|(row, _)| row.backtest_month))?,
        Series::new("months", flat.iter().map(|(_, r)| r.months).collect::<Vec<u32>>()),
        Series::new(
            "actual_return",
            flat.iter().map(|(_, r)| r.actual_return).collect::<Vec<Option<f64>>>(),
        ),
        Series::new(
            "benchmark_return",
            flat.iter().map(|(_, r)| r.benchmark_return).collect::<Vec<Option<f64>>>(),
        ),
        Series::new(
            "outperformance",
            flat.iter().map(|(_, r)| r.outperformance).collect::<Vec<Option<f64>>>(),
        ),
    ])?)
}

/// Correlation, quintile and spread frames of a report
pub fn report_frames(report: &CorrelationReport) -> Result<(DataFrame, DataFrame, DataFrame)> {
    Ok((
        correlations_frame(&report.correlations)?,
        quintiles_frame(&report.quintiles)?,
        spreads_frame(&report.spreads)?,
    ))
}

/// Write a frame as CSV with a header row
pub fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    log::debug!("Wrote {} rows to {}", df.height(), path.display());
    Ok(())
}

pub fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    ParquetWriter::new(file).finish(df)?;
    log::debug!("Wrote {} rows to {}", df.height(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyticsConfig;
    use crate::data::Dataset;
    use crate::pipeline::engine::PipelineEngine;
    use crate::types::TimeSeriesPoint;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_date_series_epoch() {
        let s = date_series("d", [date(1970, 1, 2)].into_iter()).unwrap();
        assert_eq!(s.dtype(), &DataType::Date);
        let days = s.cast(&DataType::Int32).unwrap();
        assert_eq!(days.i32().unwrap().get(0), Some(1));
    }

    #[test]
    fn test_forward_returns_keep_nulls() {
        let points: Vec<TimeSeriesPoint> = (1..=6)
            .map(|m| TimeSeriesPoint::new("SPY", date(2024, m, 3), if m <= 3 { 100.0 } else { 110.0 }, "equity"))
            .collect();
        let output = PipelineEngine::new(AnalyticsConfig::default())
            .unwrap()
            .run(&Dataset::from_points(points).unwrap());

        let df = forward_returns_frame(&output.forward_return_records()).unwrap();
        assert_eq!(df.height(), 8);
        let pct = df.column("pct_change").unwrap().f64().unwrap();
        assert_eq!(pct.get(0), Some(10.0));
        assert_eq!(pct.null_count(), 7);
    }

    #[test]
    fn test_empty_frames() {
        assert_eq!(snapshot_frame(&[]).unwrap().height(), 0);
        assert_eq!(economic_changes_frame(&[]).unwrap().width(), 5);
    }

    #[test]
    fn test_backtest_frame_flattens_periods() {
        use crate::pipeline::factors_returns::RealizedReturn;

        let row = BacktestReturns {
            entity_id: "XLK".to_string(),
            benchmark_id: "SPY".to_string(),
            backtest_month: date(2024, 1, 1),
            returns: vec![
                RealizedReturn {
                    months: 1,
                    actual_return: Some(5.0),
                    benchmark_return: Some(1.0),
                    outperformance: Some(4.0),
                },
                RealizedReturn {
                    months: 3,
                    actual_return: None,
                    benchmark_return: Some(2.0),
                    outperformance: None,
                },
            ],
        };
        let df = backtest_returns_frame(&[row]).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.column("outperformance").unwrap().null_count(), 1);
    }
}
