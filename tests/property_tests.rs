//! Property tests for pipeline invariants.
//!
//! Uses proptest to verify:
//! 1. Snapshot invariance - a snapshot never changes when later data is added
//! 2. Month consistency - every month of a quarter carries that quarter's returns
//! 3. Null forward returns - a return exists exactly when its forward quarter does
//! 4. Bucket sizes - NTILE buckets cover every observation and differ by at most one

use chrono::NaiveDate;
use econ_pit::calendar::YearMonth;
use econ_pit::config::AnalyticsConfig;
use econ_pit::data::Dataset;
use econ_pit::pipeline::{PipelineEngine, Quantiles};
use econ_pit::snapshot::SnapshotEngine;
use econ_pit::types::{Horizon, TimeSeriesPoint};
use proptest::prelude::*;

// ── Strategies (proptest) ────────────────────────────────────────────

/// (months after 2020-01, day of month, value)
fn arb_observation() -> impl Strategy<Value = (u32, u32, f64)> {
    (0u32..36, 1u32..=28, 1.0..1000.0_f64).prop_map(|(m, d, v)| (m, d, (v * 100.0).round() / 100.0))
}

fn arb_series() -> impl Strategy<Value = Vec<(u32, u32, f64)>> {
    prop::collection::vec(arb_observation(), 1..60)
}

fn to_points(entity: &str, category: &str, observations: &[(u32, u32, f64)]) -> Vec<TimeSeriesPoint> {
    let base = YearMonth::new(2020, 1).unwrap();
    observations
        .iter()
        .map(|&(offset, day, value)| {
            let month = base.add_months(offset as i64);
            let date = NaiveDate::from_ymd_opt(month.year, month.month, day).unwrap();
            TimeSeriesPoint::new(entity, date, value, category)
        })
        .collect()
}

fn arb_dataset() -> impl Strategy<Value = Dataset> {
    (arb_series(), arb_series()).prop_map(|(spy, cpi)| {
        let mut points = to_points("SPY", "equity", &spy);
        points.extend(to_points("CPI", "economic_indicator", &cpi));
        Dataset::from_points(points).unwrap()
    })
}

fn arb_anchor() -> impl Strategy<Value = NaiveDate> {
    (0i64..40, 1u32..=28).prop_map(|(offset, day)| {
        let month = YearMonth::new(2020, 1).unwrap().add_months(offset);
        NaiveDate::from_ymd_opt(month.year, month.month, day).unwrap()
    })
}

// ── 1. Snapshot invariance ───────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Computing a snapshot from the full history or from only the history
    /// visible at the anchor gives byte-identical output.
    #[test]
    fn snapshot_ignores_later_data(dataset in arb_dataset(), anchor in arb_anchor()) {
        let engine = SnapshotEngine::new(AnalyticsConfig::default()).unwrap();
        let truncated = dataset.restricted_to(anchor);

        let full = serde_json::to_string(&engine.compute(&dataset, anchor)).unwrap();
        let visible = serde_json::to_string(&engine.compute(&truncated, anchor)).unwrap();
        prop_assert_eq!(full, visible);
    }

    /// Recomputing the same anchor yields the same rows.
    #[test]
    fn snapshot_is_deterministic(dataset in arb_dataset(), anchor in arb_anchor()) {
        let engine = SnapshotEngine::new(AnalyticsConfig::default()).unwrap();
        prop_assert_eq!(engine.compute(&dataset, anchor), engine.compute(&dataset, anchor));
    }
}

// ── 2-3. Forward return structure ────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// All month rows of a quarter report the quarter's returns.
    #[test]
    fn months_share_quarter_returns(dataset in arb_dataset()) {
        let output = PipelineEngine::new(AnalyticsConfig::default()).unwrap().run(&dataset);
        for entity in &output.entities {
            for row in &entity.months {
                let quarter = entity.forward_returns.for_quarter(row.month().quarter());
                prop_assert!(quarter.is_some());
                let quarter = quarter.unwrap();
                for horizon in Horizon::ALL {
                    prop_assert_eq!(row.quarter.get(horizon), quarter.get(horizon));
                }
            }
        }
    }

    /// A forward return is non-null exactly when the quarter it looks ahead to exists.
    #[test]
    fn forward_return_null_iff_quarter_missing(dataset in arb_dataset()) {
        let output = PipelineEngine::new(AnalyticsConfig::default()).unwrap().run(&dataset);
        for entity in &output.entities {
            for record in entity.forward_returns.quarters() {
                for horizon in Horizon::ALL {
                    let target = record.quarter.add_quarters(horizon.quarters() as i64);
                    let exists = entity.quarters.iter().any(|q| q.quarter == target);
                    prop_assert_eq!(record.get(horizon).is_some(), exists);
                }
            }
        }
    }
}

// ── 4. Bucket sizes ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn buckets_cover_all_observations(n in 0usize..200, bins in 2usize..10) {
        let quantiles = Quantiles::new(bins).unwrap();
        let sizes = quantiles.bucket_sizes(n);
        prop_assert_eq!(sizes.iter().sum::<usize>(), n);

        let max = *sizes.iter().max().unwrap();
        let min = *sizes.iter().min().unwrap();
        prop_assert!(max - min <= 1);
        prop_assert!(sizes.windows(2).all(|w| w[0] >= w[1]));
    }
}
