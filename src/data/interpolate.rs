//! Monthly gap filling for indicator series
//!
//! Missing months strictly between two observations are linearly
//! interpolated. Months before the first or after the last observation are
//! filled only with an explicit backward/forward fill tag, and a month with no
//! neighbour at all is omitted.

use crate::calendar::YearMonth;
use crate::data::resample::MonthlyValue;
use crate::types::Provenance;
use std::collections::BTreeMap;

/// Fills missing months of a monthly series
#[derive(Debug, Clone, Copy, Default)]
pub struct GapInterpolator {
    fill_limit_months: Option<u32>,
}

impl GapInterpolator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap forward/backward fill at `months` months from the known value
    pub fn with_fill_limit(fill_limit_months: Option<u32>) -> Self {
        Self { fill_limit_months }
    }

    fn within_limit(&self, distance: i64) -> bool {
        match self.fill_limit_months {
            Some(limit) => distance <= limit as i64,
            None => true,
        }
    }

    /// Value for a single missing month given its nearest known neighbours.
    ///
    /// Returns `None` for a month that cannot be filled.
    pub fn fill_month(
        &self,
        month: YearMonth,
        prior: Option<&MonthlyValue>,
        next: Option<&MonthlyValue>,
    ) -> Option<MonthlyValue> {
        match (prior, next) {
            (Some(prior), Some(next)) => {
                let span = prior.month.months_until(next.month) as f64;
                let weight = prior.month.months_until(month) as f64 / span;
                let avg_value = prior.avg_value + (next.avg_value - prior.avg_value) * weight;
                let avg_volume = match (prior.avg_volume, next.avg_volume) {
                    (Some(a), Some(b)) => Some(a + (b - a) * weight),
                    _ => None,
                };
                Some(MonthlyValue {
                    month,
                    avg_value,
                    avg_volume,
                    sample_count: 0,
                    provenance: Provenance::Interpolated,
                })
            }
            (Some(prior), None) if self.within_limit(prior.month.months_until(month)) => {
                Some(MonthlyValue {
                    month,
                    sample_count: 0,
                    provenance: Provenance::ForwardFilled,
                    ..*prior
                })
            }
            (None, Some(next)) if self.within_limit(month.months_until(next.month)) => {
                Some(MonthlyValue {
                    month,
                    sample_count: 0,
                    provenance: Provenance::BackwardFilled,
                    ..*next
                })
            }
            _ => None,
        }
    }

    /// Fill every missing month in `[start, end]`.
    ///
    /// Observed months are returned unchanged (including any outside the
    /// range); the result is ordered by month.
    pub fn fill(&self, observed: &[MonthlyValue], start: YearMonth, end: YearMonth) -> Vec<MonthlyValue> {
        let known: BTreeMap<YearMonth, MonthlyValue> =
            observed.iter().map(|m| (m.month, *m)).collect();
        let mut filled = known.clone();

        for month in YearMonth::range_inclusive(start, end) {
            if known.contains_key(&month) {
                continue;
            }
            let prior = known.range(..month).next_back().map(|(_, v)| v);
            let next = known.range(month..).next().map(|(_, v)| v);
            if let Some(value) = self.fill_month(month, prior, next) {
                filled.insert(month, value);
            }
        }

        filled.into_values().collect()
    }
}
