//! Integration tests for the aggregation, forward-return and correlation pipeline

use chrono::NaiveDate;
use econ_pit::analysis::{CorrelationAnalyzer, JoinedObservation};
use econ_pit::calendar::{YearMonth, YearQuarter};
use econ_pit::config::{AnalyticsConfig, ChangeWindow};
use econ_pit::data::{Dataset, QuarterlyValue, SamplingGrain};
use econ_pit::pipeline::{ForwardReturnCalculator, PipelineEngine, PipelineOutput};
use econ_pit::types::{Horizon, PeriodGrain, Provenance, SeriesRole, TimeSeriesPoint};
use std::sync::Arc;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// One point per month on the 15th, starting at `start`
fn monthly(entity: &str, category: &str, start: (i32, u32), values: &[f64]) -> Vec<TimeSeriesPoint> {
    let first = YearMonth::new(start.0, start.1).unwrap();
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let month = first.add_months(i as i64);
            TimeSeriesPoint::new(entity, date(month.year, month.month, 15), v, category)
        })
        .collect()
}

/// Each quarter's level repeated for its three months
fn quarter_levels(levels: &[f64]) -> Vec<f64> {
    levels.iter().flat_map(|&l| [l, l, l]).collect()
}

fn run(points: Vec<TimeSeriesPoint>) -> PipelineOutput {
    let dataset = Dataset::from_points(points).unwrap();
    PipelineEngine::new(AnalyticsConfig::default()).unwrap().run(&dataset)
}

#[test]
fn test_full_history_quarter_forward_return() {
    let output = run(monthly("SPY", "equity", (2024, 1), &quarter_levels(&[100.0, 110.0])));
    let spy = output.entity("SPY").unwrap();

    let q1 = spy
        .forward_returns
        .for_quarter(YearQuarter::new(2024, 1).unwrap())
        .unwrap();
    assert_eq!(q1.get(Horizon::Q1), Some(10.0));
    assert_eq!(q1.get(Horizon::Q2), None);
    for row in &spy.months[..3] {
        assert_eq!(row.quarter.get(Horizon::Q1), Some(10.0));
    }
}

#[test]
fn test_forward_return_hidden_before_next_quarter() {
    let dataset = Dataset::from_points(monthly("SPY", "equity", (2024, 1), &quarter_levels(&[100.0, 110.0]))).unwrap();
    let output = PipelineEngine::new(AnalyticsConfig::default())
        .unwrap()
        .run_as_of(&dataset, date(2024, 3, 31));

    let spy = output.entity("SPY").unwrap();
    assert_eq!(spy.months.len(), 3);
    assert!(spy.months.iter().all(|m| m.quarter.get(Horizon::Q1).is_none()));
}

#[test]
fn test_month_rows_share_quarter_record() {
    let values: Vec<f64> = (0..24).map(|i| 100.0 + (i * i % 17) as f64).collect();
    let output = run(monthly("SPY", "equity", (2022, 1), &values));
    let spy = output.entity("SPY").unwrap();

    for row in &spy.months {
        let quarter = spy.forward_returns.for_quarter(row.month().quarter()).unwrap();
        assert!(Arc::ptr_eq(&row.quarter, quarter));
    }
}

#[test]
fn test_flat_quarter_is_zero_not_null() {
    let output = run(monthly("SPY", "equity", (2024, 1), &quarter_levels(&[100.0, 100.0])));
    let records = output.forward_return_records();

    let q1 = records
        .iter()
        .find(|r| r.period_date == date(2024, 1, 1) && r.horizon == Horizon::Q1)
        .unwrap();
    assert_eq!(q1.pct_change, Some(0.0));

    let q2 = records
        .iter()
        .find(|r| r.period_date == date(2024, 4, 1) && r.horizon == Horizon::Q1)
        .unwrap();
    assert_eq!(q2.pct_change, None);
}

#[test]
fn test_gap_in_quarters_yields_null() {
    // Q1 and Q3 observed, Q2 missing: Q1's one-quarter return must not use Q3
    let mut points = monthly("SPY", "equity", (2024, 1), &[100.0, 100.0, 100.0]);
    points.extend(monthly("SPY", "equity", (2024, 7), &[120.0, 120.0, 120.0]));
    let output = run(points);

    let q1 = output
        .entity("SPY")
        .unwrap()
        .forward_returns
        .for_quarter(YearQuarter::new(2024, 1).unwrap())
        .unwrap()
        .clone();
    assert_eq!(q1.get(Horizon::Q1), None);
    assert_eq!(q1.get(Horizon::Q2), Some(20.0));
}

#[test]
fn test_indicator_interpolation_and_change() {
    let points = vec![
        TimeSeriesPoint::new("CPI", date(2024, 1, 15), 90.0, "economic_indicator"),
        TimeSeriesPoint::new("CPI", date(2024, 3, 15), 110.0, "economic_indicator"),
    ];
    let output = run(points);
    let cpi = output.entity("CPI").unwrap();
    assert_eq!(cpi.role, SeriesRole::Indicator);

    let feb = cpi.month(YearMonth::new(2024, 2).unwrap()).unwrap();
    assert_eq!(feb.value.avg_value, 100.0);
    assert_eq!(feb.value.provenance, Provenance::Interpolated);

    let feb_change = cpi
        .changes
        .iter()
        .find(|c| c.period_date == date(2024, 2, 1))
        .unwrap();
    assert_eq!(feb_change.mom_pct, Some(11.11));
    assert_eq!(cpi.changes[0].mom_pct, None);
}

#[test]
fn test_market_series_not_gap_filled() {
    let points = vec![
        TimeSeriesPoint::new("SPY", date(2024, 1, 15), 90.0, "equity"),
        TimeSeriesPoint::new("SPY", date(2024, 3, 15), 110.0, "equity"),
    ];
    let output = run(points);
    let spy = output.entity("SPY").unwrap();
    assert!(spy.month(YearMonth::new(2024, 2).unwrap()).is_none());

    let quarter = spy
        .aggregates()
        .into_iter()
        .find(|a| a.grain == PeriodGrain::Quarter)
        .unwrap();
    assert_eq!(quarter.avg_value, 100.0);
    assert_eq!(quarter.sample_count, 2);
}

#[test]
fn test_daily_series_classified_and_averaged() {
    let mut points = Vec::new();
    let mut day = date(2024, 1, 1);
    while day <= date(2024, 12, 31) {
        points.push(TimeSeriesPoint::new("SPY", day, 100.0, "equity").with_volume(10.0));
        day = day.succ_opt().unwrap();
    }
    let output = run(points);
    let spy = output.entity("SPY").unwrap();
    assert_eq!(spy.grain, SamplingGrain::Daily);
    assert_eq!(spy.months.len(), 12);
    assert_eq!(spy.months[0].value.sample_count, 31);
    assert_eq!(spy.months[0].value.avg_volume, Some(10.0));
}

/// SPY over 2020-01..2020-12 and a monthly CPI over the same months
fn correlation_dataset(quarters: &[f64], cpi: &[f64]) -> Vec<TimeSeriesPoint> {
    let mut points = monthly("SPY", "equity", (2020, 1), &quarter_levels(quarters));
    points.extend(monthly("CPI", "economic_indicator", (2020, 1), cpi));
    points
}

#[test]
fn test_correlation_with_eight_observations_omitted() {
    let cpi = [100.0, 101.0, 103.0, 102.0, 105.0, 107.0, 106.0, 110.0, 111.0, 115.0, 113.0, 118.0];
    let output = run(correlation_dataset(&[100.0, 110.0, 99.0, 120.0], &cpi));

    // Q1 horizon pairs: CPI changes Feb..Sep against Q1-Q3 returns = 8
    let report = CorrelationAnalyzer::new(&AnalyticsConfig::default())
        .unwrap()
        .analyze_output(&output, ChangeWindow::MonthOverMonth);
    assert!(report.correlations.is_empty());
}

#[test]
fn test_correlation_reported_with_enough_observations() {
    let cpi = [
        100.0, 101.0, 103.0, 102.0, 105.0, 107.0, 106.0, 110.0, 111.0, 115.0, 113.0, 118.0, 120.0, 121.0,
        125.0,
    ];
    let output = run(correlation_dataset(&[100.0, 110.0, 99.0, 120.0, 125.0], &cpi));
    let report = CorrelationAnalyzer::new(&AnalyticsConfig::default())
        .unwrap()
        .analyze_output(&output, ChangeWindow::MonthOverMonth);

    assert_eq!(report.correlations.len(), 1);
    let row = &report.correlations[0];
    assert_eq!((row.entity_id.as_str(), row.series_id.as_str()), ("SPY", "CPI"));
    assert_eq!(row.horizon, Horizon::Q1);
    assert_eq!(row.observation_count, 11);
    assert!(row.correlation_coefficient.abs() <= 1.0);

    // 11 observations bucket as 3,2,2,2,2: only the first bucket is reported
    let q1: Vec<_> = report.quintiles.iter().filter(|q| q.horizon == Horizon::Q1).collect();
    assert_eq!(q1.len(), 1);
    assert_eq!((q1[0].quintile, q1[0].observation_count), (1, 3));
    // no growing bucket is reported, so no spread
    assert!(report.spreads.iter().all(|s| s.horizon != Horizon::Q1));
}

fn joined(pairs: &[(f64, f64)]) -> Vec<JoinedObservation> {
    pairs
        .iter()
        .enumerate()
        .map(|(i, &(change, ret))| {
            let quarters = [
                QuarterlyValue {
                    quarter: YearQuarter::new(2010, 1).unwrap(),
                    avg_value: 100.0,
                    avg_volume: None,
                    month_count: 3,
                    filled_count: 0,
                },
                QuarterlyValue {
                    quarter: YearQuarter::new(2010, 2).unwrap(),
                    avg_value: 100.0 + ret,
                    avg_volume: None,
                    month_count: 3,
                    filled_count: 0,
                },
            ];
            let table = ForwardReturnCalculator::default().compute("SPY", &quarters);
            let forward = Arc::clone(table.quarters().next().unwrap());
            JoinedObservation {
                entity_id: "SPY".to_string(),
                series_id: "GDP".to_string(),
                period_date: YearMonth::new(2000, 1).unwrap().add_months(i as i64).first_day(),
                econ_change: Some(change),
                forward,
            }
        })
        .collect()
}

#[test]
fn test_two_observation_bucket_omitted() {
    let pairs: Vec<(f64, f64)> = (0..13).map(|i| (i as f64 - 6.0, i as f64 * 0.5)).collect();
    let report = CorrelationAnalyzer::new(&AnalyticsConfig::default())
        .unwrap()
        .analyze(&joined(&pairs));

    let q1: Vec<_> = report.quintiles.iter().filter(|q| q.horizon == Horizon::Q1).collect();
    let buckets: Vec<(usize, usize)> = q1.iter().map(|q| (q.quintile, q.observation_count)).collect();
    assert_eq!(buckets, vec![(1, 3), (2, 3), (3, 3)]);
}

#[test]
fn test_quintile_count_is_configurable() {
    let config = AnalyticsConfig {
        quintile_count: 4,
        min_bucket_observations: 2,
        ..Default::default()
    };
    let pairs: Vec<(f64, f64)> = (0..8).map(|i| (i as f64, i as f64)).collect();
    let report = CorrelationAnalyzer::new(&config).unwrap().analyze(&joined(&pairs));

    let q1: Vec<_> = report.quintiles.iter().filter(|q| q.horizon == Horizon::Q1).collect();
    assert_eq!(q1.len(), 4);
    let spread = report.spreads.iter().find(|s| s.horizon == Horizon::Q1).unwrap();
    // declining = buckets 1-2 (0..=3), growing = buckets 3-4 (4..=7)
    assert!((spread.spread - 4.0).abs() < 1e-9);
}
