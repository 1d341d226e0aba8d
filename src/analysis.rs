//! Correlation and quintile analysis of economic changes against forward returns
//!
//! Observations pair an indicator's monthly change with a market entity's
//! forward returns for the same month. Small samples are omitted from the
//! output rather than reported as zero or null correlations.

use crate::config::{AnalyticsConfig, ChangeWindow};
use crate::error::Result;
use crate::pipeline::classifiers::Quantiles;
use crate::pipeline::engine::PipelineOutput;
use crate::pipeline::factors_returns::QuarterForwardReturns;
use crate::pipeline::factors_statistical::{mean, pearson};
use crate::types::{EntityId, Horizon, Pct, SeriesRole};
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One month of an (entity, series) pair
#[derive(Debug, Clone)]
pub struct JoinedObservation {
    pub entity_id: EntityId,
    pub series_id: EntityId,
    pub period_date: NaiveDate,
    pub econ_change: Option<Pct>,
    pub forward: Arc<QuarterForwardReturns>,
}

impl JoinedObservation {
    /// The (change, forward return) pair for a horizon, if both exist
    pub fn pair(&self, horizon: Horizon) -> Option<(f64, f64)> {
        Some((self.econ_change?, self.forward.get(horizon)?))
    }
}

/// Join every market entity with every indicator series on month
pub fn join_observations(output: &PipelineOutput, window: ChangeWindow) -> Vec<JoinedObservation> {
    let mut joined = Vec::new();
    for market in output.with_role(SeriesRole::Market) {
        for indicator in output.with_role(SeriesRole::Indicator) {
            for change in &indicator.changes {
                if let Some(row) = market.month(change.month()) {
                    joined.push(JoinedObservation {
                        entity_id: market.entity_id.clone(),
                        series_id: indicator.entity_id.clone(),
                        period_date: change.period_date,
                        econ_change: change.change(window),
                        forward: Arc::clone(&row.quarter),
                    });
                }
            }
        }
    }
    joined
}

/// Correlation row of the `CorrelationResult` relation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationResult {
    pub entity_id: EntityId,
    pub series_id: EntityId,
    pub horizon: Horizon,
    pub correlation_coefficient: f64,
    pub observation_count: usize,
}

/// Quintile row of the `CorrelationResult` relation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuintileResult {
    pub entity_id: EntityId,
    pub series_id: EntityId,
    pub horizon: Horizon,
    /// 1 = most declining change, `quintile_count` = most growing
    pub quintile: usize,
    pub mean_return: f64,
    pub observation_count: usize,
}

/// Mean forward return when the economy is growing minus when it is declining
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthSpread {
    pub entity_id: EntityId,
    pub series_id: EntityId,
    pub horizon: Horizon,
    pub growing_mean: f64,
    pub declining_mean: f64,
    pub spread: f64,
    pub observation_count: usize,
}

/// All relations produced by one analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelationReport {
    pub correlations: Vec<CorrelationResult>,
    pub quintiles: Vec<QuintileResult>,
    pub spreads: Vec<GrowthSpread>,
}

impl CorrelationReport {
    fn extend(&mut self, other: CorrelationReport) {
        self.correlations.extend(other.correlations);
        self.quintiles.extend(other.quintiles);
        self.spreads.extend(other.spreads);
    }

    pub fn is_empty(&self) -> bool {
        self.correlations.is_empty() && self.quintiles.is_empty() && self.spreads.is_empty()
    }

    /// Correlation rows of the `n` (entity, series) pairs with the strongest
    /// absolute coefficient across horizons
    pub fn top_correlations(&self, n: usize) -> Vec<&CorrelationResult> {
        let mut strength: BTreeMap<(&str, &str), f64> = BTreeMap::new();
        for row in &self.correlations {
            let entry = strength
                .entry((row.entity_id.as_str(), row.series_id.as_str()))
                .or_insert(0.0);
            *entry = entry.max(row.correlation_coefficient.abs());
        }

        let mut ranked: Vec<((&str, &str), f64)> = strength.into_iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(n);

        let correlations = &self.correlations;
        ranked
            .into_iter()
            .flat_map(move |(key, _)| {
                correlations
                    .iter()
                    .filter(move |r| (r.entity_id.as_str(), r.series_id.as_str()) == key)
            })
            .collect()
    }
}

/// Correlation and quintile analyzer with sample-size gating
#[derive(Debug, Clone)]
pub struct CorrelationAnalyzer {
    quantiles: Quantiles,
    min_observations: usize,
    min_bucket_observations: usize,
    parallel: bool,
}

impl CorrelationAnalyzer {
    pub fn new(config: &AnalyticsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            quantiles: Quantiles::new(config.quintile_count)?,
            min_observations: config.min_correlation_observations,
            min_bucket_observations: config.min_bucket_observations,
            parallel: config.parallel,
        })
    }

    /// Join a pipeline run and analyze it
    pub fn analyze_output(&self, output: &PipelineOutput, window: ChangeWindow) -> CorrelationReport {
        self.analyze(&join_observations(output, window))
    }

    /// Analyze joined observations, grouped by (entity, series)
    pub fn analyze(&self, observations: &[JoinedObservation]) -> CorrelationReport {
        let mut groups: BTreeMap<(&str, &str), Vec<&JoinedObservation>> = BTreeMap::new();
        for obs in observations {
            groups
                .entry((obs.entity_id.as_str(), obs.series_id.as_str()))
                .or_default()
                .push(obs);
        }
        for group in groups.values_mut() {
            group.sort_by_key(|o| o.period_date);
        }

        let groups: Vec<Vec<&JoinedObservation>> = groups.into_values().collect();
        let partials: Vec<CorrelationReport> = if self.parallel {
            groups.par_iter().map(|g| self.analyze_group(g)).collect()
        } else {
            groups.iter().map(|g| self.analyze_group(g)).collect()
        };

        let mut report = CorrelationReport::default();
        for partial in partials {
            report.extend(partial);
        }
        report
    }

    /// Analyze one (entity, series) pair; observations must be date-ordered.
    ///
    /// Bucket labels are assigned once over every observation with a change,
    /// so a month sits in the same bucket at every horizon. Each horizon then
    /// averages the returns it has within those buckets.
    fn analyze_group(&self, group: &[&JoinedObservation]) -> CorrelationReport {
        let mut report = CorrelationReport::default();
        let Some(first) = group.first() else {
            return report;
        };

        let ranked: Vec<(&JoinedObservation, f64)> = group
            .iter()
            .filter_map(|o| o.econ_change.map(|change| (*o, change)))
            .collect();
        let changes: Vec<f64> = ranked.iter().map(|(_, change)| *change).collect();
        let labels = self.quantiles.assign(&changes);

        for horizon in Horizon::ALL {
            let pairs: Vec<(f64, f64)> = group.iter().filter_map(|o| o.pair(horizon)).collect();
            if pairs.len() >= self.min_observations {
                let changes: Vec<f64> = pairs.iter().map(|p| p.0).collect();
                let returns: Vec<f64> = pairs.iter().map(|p| p.1).collect();
                if let Some(coefficient) = pearson(&changes, &returns) {
                    report.correlations.push(CorrelationResult {
                        entity_id: first.entity_id.clone(),
                        series_id: first.series_id.clone(),
                        horizon,
                        correlation_coefficient: coefficient,
                        observation_count: pairs.len(),
                    });
                }
            }

            let buckets = self.bucket_returns(&ranked, &labels, horizon);
            for (idx, bucket) in buckets.iter().enumerate() {
                if let Some(mean_return) = bucket.as_ref().and_then(|b| mean(b)) {
                    report.quintiles.push(QuintileResult {
                        entity_id: first.entity_id.clone(),
                        series_id: first.series_id.clone(),
                        horizon,
                        quintile: idx + 1,
                        mean_return,
                        observation_count: bucket.as_ref().map_or(0, |b| b.len()),
                    });
                }
            }

            if let Some((growing_mean, declining_mean, observation_count)) = self.spread(&buckets) {
                report.spreads.push(GrowthSpread {
                    entity_id: first.entity_id.clone(),
                    series_id: first.series_id.clone(),
                    horizon,
                    growing_mean,
                    declining_mean,
                    spread: growing_mean - declining_mean,
                    observation_count,
                });
            }
        }
        report
    }

    /// Returns at `horizon` grouped by change bucket; buckets below the
    /// minimum size are `None`
    fn bucket_returns(
        &self,
        ranked: &[(&JoinedObservation, f64)],
        labels: &[usize],
        horizon: Horizon,
    ) -> Vec<Option<Vec<f64>>> {
        let mut buckets: Vec<Vec<f64>> = vec![Vec::new(); self.quantiles.bins()];
        for ((obs, _), &label) in ranked.iter().zip(labels) {
            if let Some(ret) = obs.forward.get(horizon) {
                buckets[label - 1].push(ret);
            }
        }
        buckets
            .into_iter()
            .map(|b| (b.len() >= self.min_bucket_observations).then_some(b))
            .collect()
    }

    /// Growing mean, declining mean and pooled count over the top and bottom
    /// halves of the reported buckets
    fn spread(&self, buckets: &[Option<Vec<f64>>]) -> Option<(f64, f64, usize)> {
        let half = buckets.len() / 2;
        let pool = |slice: &[Option<Vec<f64>>]| -> Vec<f64> {
            slice.iter().flatten().flat_map(|b| b.iter().copied()).collect()
        };
        let declining = pool(&buckets[..half]);
        let growing = pool(&buckets[buckets.len() - half..]);

        Some((mean(&growing)?, mean(&declining)?, declining.len() + growing.len()))
    }
}
