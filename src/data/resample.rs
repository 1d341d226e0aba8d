//! Period aggregation
//!
//! Raw points are bucketed into monthly averages first. Quarterly values are
//! then the mean of the quarter's monthly averages, never a re-average of the
//! raw points, so a quarter does not depend on how many observations landed in
//! each of its months.

use crate::calendar::{YearMonth, YearQuarter};
use crate::types::{EntityId, PeriodGrain, Provenance, Quantity, TimeSeriesPoint, Value};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Output relation row for monthly and quarterly aggregates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodAggregate {
    pub entity_id: EntityId,
    pub period_date: NaiveDate,
    pub grain: PeriodGrain,
    pub avg_value: Value,
    pub avg_volume: Option<Quantity>,
    /// Raw points for a month, months for a quarter
    pub sample_count: u32,
    /// Months that were gap-filled rather than observed
    pub filled_count: u32,
}

/// Monthly average for one entity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthlyValue {
    pub month: YearMonth,
    pub avg_value: Value,
    pub avg_volume: Option<Quantity>,
    pub sample_count: u32,
    pub provenance: Provenance,
}

impl MonthlyValue {
    pub fn to_aggregate(&self, entity_id: &str) -> PeriodAggregate {
        PeriodAggregate {
            entity_id: entity_id.to_string(),
            period_date: self.month.first_day(),
            grain: PeriodGrain::Month,
            avg_value: self.avg_value,
            avg_volume: self.avg_volume,
            sample_count: self.sample_count,
            filled_count: u32::from(!self.provenance.is_actual()),
        }
    }
}

/// Quarterly average for one entity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuarterlyValue {
    pub quarter: YearQuarter,
    pub avg_value: Value,
    pub avg_volume: Option<Quantity>,
    pub month_count: u32,
    pub filled_count: u32,
}

impl QuarterlyValue {
    pub fn to_aggregate(&self, entity_id: &str) -> PeriodAggregate {
        PeriodAggregate {
            entity_id: entity_id.to_string(),
            period_date: self.quarter.first_day(),
            grain: PeriodGrain::Quarter,
            avg_value: self.avg_value,
            avg_volume: self.avg_volume,
            sample_count: self.month_count,
            filled_count: self.filled_count,
        }
    }

    /// Whether all three months of the quarter contributed
    pub fn is_complete(&self) -> bool {
        self.month_count == 3
    }
}

/// Running mean of values and (optional) volumes
#[derive(Debug, Default)]
struct MeanAccumulator {
    value_sum: f64,
    value_count: u32,
    volume_sum: f64,
    volume_count: u32,
    filled: u32,
}

impl MeanAccumulator {
    fn add(&mut self, value: f64, volume: Option<f64>) {
        self.value_sum += value;
        self.value_count += 1;
        if let Some(volume) = volume {
            self.volume_sum += volume;
            self.volume_count += 1;
        }
    }

    fn mean_value(&self) -> Option<f64> {
        if self.value_count == 0 {
            None
        } else {
            Some(self.value_sum / self.value_count as f64)
        }
    }

    fn mean_volume(&self) -> Option<f64> {
        if self.volume_count == 0 {
            None
        } else {
            Some(self.volume_sum / self.volume_count as f64)
        }
    }
}

/// Two-step monthly/quarterly aggregator
#[derive(Debug, Clone, Copy, Default)]
pub struct PeriodAggregator;

impl PeriodAggregator {
    /// Average raw points into calendar months, ordered by month
    pub fn monthly(points: &[TimeSeriesPoint]) -> Vec<MonthlyValue> {
        let mut buckets: BTreeMap<YearMonth, MeanAccumulator> = BTreeMap::new();
        for point in points {
            buckets
                .entry(YearMonth::of(point.date))
                .or_default()
                .add(point.value, point.volume);
        }

        buckets
            .into_iter()
            .filter_map(|(month, acc)| {
                acc.mean_value().map(|avg_value| MonthlyValue {
                    month,
                    avg_value,
                    avg_volume: acc.mean_volume(),
                    sample_count: acc.value_count,
                    provenance: Provenance::Actual,
                })
            })
            .collect()
    }

    /// Average monthly values into calendar quarters, ordered by quarter
    pub fn quarterly(months: &[MonthlyValue]) -> Vec<QuarterlyValue> {
        let mut buckets: BTreeMap<YearQuarter, MeanAccumulator> = BTreeMap::new();
        for month in months {
            let acc = buckets.entry(month.month.quarter()).or_default();
            acc.add(month.avg_value, month.avg_volume);
            if !month.provenance.is_actual() {
                acc.filled += 1;
            }
        }

        buckets
            .into_iter()
            .filter_map(|(quarter, acc)| {
                acc.mean_value().map(|avg_value| QuarterlyValue {
                    quarter,
                    avg_value,
                    avg_volume: acc.mean_volume(),
                    month_count: acc.value_count,
                    filled_count: acc.filled,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn point(y: i32, m: u32, d: u32, value: f64) -> TimeSeriesPoint {
        TimeSeriesPoint::new("SPY", NaiveDate::from_ymd_opt(y, m, d).unwrap(), value, "equity")
    }

    #[test]
    fn test_monthly_average() {
        let points = vec![
            point(2024, 1, 2, 100.0).with_volume(10.0),
            point(2024, 1, 3, 110.0).with_volume(30.0),
            point(2024, 2, 1, 120.0),
        ];
        let months = PeriodAggregator::monthly(&points);

        assert_eq!(months.len(), 2);
        assert_relative_eq!(months[0].avg_value, 105.0);
        assert_eq!(months[0].avg_volume, Some(20.0));
        assert_eq!(months[0].sample_count, 2);
        assert_eq!(months[1].avg_volume, None);
        assert_eq!(months[1].provenance, Provenance::Actual);
    }

    #[test]
    fn test_quarter_is_mean_of_monthly_means() {
        // January has many points, February and March one each
        let mut points: Vec<TimeSeriesPoint> = (1..=20).map(|d| point(2024, 1, d, 100.0)).collect();
        points.push(point(2024, 2, 15, 130.0));
        points.push(point(2024, 3, 15, 160.0));

        let quarters = PeriodAggregator::quarterly(&PeriodAggregator::monthly(&points));

        assert_eq!(quarters.len(), 1);
        // (100 + 130 + 160) / 3, not the raw-point mean of ~106
        assert_relative_eq!(quarters[0].avg_value, 130.0);
        assert_eq!(quarters[0].month_count, 3);
        assert!(quarters[0].is_complete());
    }

    #[test]
    fn test_partial_quarter() {
        let points = vec![point(2024, 4, 10, 50.0)];
        let quarters = PeriodAggregator::quarterly(&PeriodAggregator::monthly(&points));
        assert_eq!(quarters[0].quarter, YearQuarter::new(2024, 2).unwrap());
        assert_eq!(quarters[0].month_count, 1);
        assert!(!quarters[0].is_complete());
    }

    #[test]
    fn test_aggregate_rows() {
        let months = PeriodAggregator::monthly(&[point(2024, 5, 20, 42.0)]);
        let row = months[0].to_aggregate("SPY");
        assert_eq!(row.period_date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(row.grain, PeriodGrain::Month);
        assert_eq!(row.filled_count, 0);

        let quarter = PeriodAggregator::quarterly(&months)[0].to_aggregate("SPY");
        assert_eq!(quarter.period_date, NaiveDate::from_ymd_opt(2024, 4, 1).unwrap());
        assert_eq!(quarter.grain, PeriodGrain::Quarter);
    }
}
