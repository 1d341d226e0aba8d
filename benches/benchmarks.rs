use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use econ_pit::{
    analysis::CorrelationAnalyzer,
    calendar::month_start_anchors,
    config::{AnalyticsConfig, ChangeWindow},
    data::Dataset,
    pipeline::PipelineEngine,
    snapshot::SnapshotEngine,
    types::TimeSeriesPoint,
};

/// Ten years of daily prices for `symbols` entities plus monthly indicators
fn build_dataset(symbols: usize, indicators: usize) -> Dataset {
    let start = NaiveDate::from_ymd_opt(2014, 1, 1).unwrap();
    let mut points = Vec::new();

    for s in 0..symbols {
        let id = format!("SYM{}", s);
        for day in 0..3650 {
            let value = 100.0 + ((day * (s + 3)) % 97) as f64 * 0.5;
            points.push(
                TimeSeriesPoint::new(id.clone(), start + Duration::days(day as i64), value, "equity")
                    .with_volume(10_000.0),
            );
        }
    }
    for i in 0..indicators {
        let id = format!("IND{}", i);
        for month in 0..120 {
            let value = 200.0 + month as f64 * 0.3 + ((month * (i + 5)) % 11) as f64;
            points.push(TimeSeriesPoint::new(
                id.clone(),
                start + Duration::days(month as i64 * 30),
                value,
                "economic_indicator",
            ));
        }
    }
    Dataset::from_points(points).unwrap()
}

fn benchmark_pipeline(c: &mut Criterion) {
    let dataset = build_dataset(20, 5);
    let engine = PipelineEngine::new(AnalyticsConfig::default()).unwrap();

    c.bench_function("pipeline_20_daily_5_monthly", |b| {
        b.iter(|| engine.run(black_box(&dataset)));
    });
}

fn benchmark_correlation(c: &mut Criterion) {
    let dataset = build_dataset(20, 5);
    let config = AnalyticsConfig::default();
    let output = PipelineEngine::new(config.clone()).unwrap().run(&dataset);
    let analyzer = CorrelationAnalyzer::new(&config).unwrap();

    c.bench_function("correlation_100_pairs", |b| {
        b.iter(|| analyzer.analyze_output(black_box(&output), ChangeWindow::MonthOverMonth));
    });
}

fn benchmark_snapshots(c: &mut Criterion) {
    let dataset = build_dataset(5, 2);
    let engine = SnapshotEngine::new(AnalyticsConfig::default()).unwrap();
    let anchors = month_start_anchors(
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2023, 12, 1).unwrap(),
    );

    c.bench_function("snapshots_48_anchors", |b| {
        b.iter(|| engine.compute_all(black_box(&dataset), &anchors));
    });
}

criterion_group!(
    benches,
    benchmark_pipeline,
    benchmark_correlation,
    benchmark_snapshots
);
criterion_main!(benches);
