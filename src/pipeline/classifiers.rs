//! Classifiers - rank-based bucketing of observations
//!
//! Buckets follow SQL `NTILE` semantics: observations are ranked ascending
//! and split into `bins` groups whose sizes differ by at most one, with the
//! larger groups first.

use crate::error::{AnalyticsError, Result};
use std::cmp::Ordering;

/// Quantiles - assign observations to N equal-sized ranked buckets
///
/// Example: `Quantiles::new(5)` creates quintiles labelled 1 (lowest) to 5.
#[derive(Debug, Clone, Copy)]
pub struct Quantiles {
    bins: usize,
}

impl Quantiles {
    pub fn new(bins: usize) -> Result<Self> {
        if bins < 2 {
            return Err(AnalyticsError::ConfigError(
                "bins must be at least 2".to_string(),
            ));
        }
        Ok(Self { bins })
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Size of each bucket for `n` observations
    pub fn bucket_sizes(&self, n: usize) -> Vec<usize> {
        let base = n / self.bins;
        let extra = n % self.bins;
        (0..self.bins)
            .map(|idx| if idx < extra { base + 1 } else { base })
            .collect()
    }

    /// 1-based bucket label for each value, in input order.
    ///
    /// Ties keep input order, so callers that want a deterministic ranking
    /// should pass values sorted by a secondary key (e.g. date).
    pub fn assign(&self, values: &[f64]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|&a, &b| {
            values[a]
                .partial_cmp(&values[b])
                .unwrap_or(Ordering::Equal)
                .then(a.cmp(&b))
        });

        let mut labels = vec![0; values.len()];
        let mut ranked = order.into_iter();
        for (bucket, size) in self.bucket_sizes(values.len()).into_iter().enumerate() {
            for idx in ranked.by_ref().take(size) {
                labels[idx] = bucket + 1;
            }
        }
        labels
    }
}
