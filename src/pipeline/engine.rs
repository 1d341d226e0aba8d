//! Pipeline execution engine
//!
//! One generic pass is applied to every entity regardless of category:
//! classify grain, aggregate to months, gap-fill indicator series, aggregate
//! to quarters, compute forward returns and (for indicators) economic changes.
//! The category only decides the entity's [`SeriesRole`].

use crate::calendar::YearMonth;
use crate::config::AnalyticsConfig;
use crate::data::{
    Dataset, EntitySeries, GapInterpolator, GrainClassifier, MonthlyValue, PeriodAggregate,
    PeriodAggregator, QuarterlyValue, SamplingGrain,
};
use crate::error::Result;
use crate::pipeline::factors_returns::{
    EconomicChange, EconomicChangeCalculator, ForwardReturnCalculator, ForwardReturnRecord,
    ForwardReturnTable, QuarterForwardReturns,
};
use crate::types::{EntityId, SeriesRole, Value};
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A month of one entity, pointing at its quarter's forward returns
#[derive(Debug, Clone)]
pub struct MonthRow {
    pub value: MonthlyValue,
    pub quarter: Arc<QuarterForwardReturns>,
}

impl MonthRow {
    pub fn month(&self) -> YearMonth {
        self.value.month
    }
}

/// Everything computed for one entity
#[derive(Debug, Clone)]
pub struct EntityOutput {
    pub entity_id: EntityId,
    pub category: String,
    pub role: SeriesRole,
    pub grain: SamplingGrain,
    pub months: Vec<MonthRow>,
    pub quarters: Vec<QuarterlyValue>,
    pub forward_returns: ForwardReturnTable,
    pub changes: Vec<EconomicChange>,
}

impl EntityOutput {
    /// Monthly then quarterly aggregate rows
    pub fn aggregates(&self) -> Vec<PeriodAggregate> {
        self.months
            .iter()
            .map(|m| m.value.to_aggregate(&self.entity_id))
            .chain(self.quarters.iter().map(|q| q.to_aggregate(&self.entity_id)))
            .collect()
    }

    /// Monthly average value keyed by month
    pub fn monthly_levels(&self) -> BTreeMap<YearMonth, Value> {
        self.months
            .iter()
            .map(|m| (m.month(), m.value.avg_value))
            .collect()
    }

    pub fn month(&self, month: YearMonth) -> Option<&MonthRow> {
        self.months
            .binary_search_by_key(&month, |m| m.month())
            .ok()
            .map(|idx| &self.months[idx])
    }
}

/// Entity left out of aggregation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedEntity {
    pub entity_id: EntityId,
    pub grain: SamplingGrain,
}

/// Result of one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub as_of: Option<NaiveDate>,
    pub entities: Vec<EntityOutput>,
    pub excluded: Vec<ExcludedEntity>,
}

impl PipelineOutput {
    fn empty() -> Self {
        Self {
            as_of: None,
            entities: Vec::new(),
            excluded: Vec::new(),
        }
    }

    pub fn entity(&self, entity_id: &str) -> Option<&EntityOutput> {
        self.entities.iter().find(|e| e.entity_id == entity_id)
    }

    /// Entities playing a given role
    pub fn with_role(&self, role: SeriesRole) -> impl Iterator<Item = &EntityOutput> {
        self.entities.iter().filter(move |e| e.role == role)
    }

    /// `PeriodAggregate` relation
    pub fn aggregates(&self) -> Vec<PeriodAggregate> {
        self.entities.iter().flat_map(|e| e.aggregates()).collect()
    }

    /// `ForwardReturnRecord` relation
    pub fn forward_return_records(&self) -> Vec<ForwardReturnRecord> {
        self.entities
            .iter()
            .flat_map(|e| e.forward_returns.records())
            .collect()
    }

    /// Economic change rows for indicator series
    pub fn economic_changes(&self) -> Vec<EconomicChange> {
        self.entities
            .iter()
            .flat_map(|e| e.changes.iter().cloned())
            .collect()
    }
}

/// Runs the per-entity pipeline over a dataset
#[derive(Debug, Clone)]
pub struct PipelineEngine {
    config: AnalyticsConfig,
    classifier: GrainClassifier,
    interpolator: GapInterpolator,
    returns: ForwardReturnCalculator,
    changes: EconomicChangeCalculator,
}

impl PipelineEngine {
    /// Create an engine, validating the configuration
    pub fn new(config: AnalyticsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            classifier: GrainClassifier::new(config.grain_window_months),
            interpolator: GapInterpolator::with_fill_limit(config.fill_limit_months),
            returns: ForwardReturnCalculator::new(config.return_precision),
            changes: EconomicChangeCalculator::new(
                config.return_precision,
                config.delta_windows.clone(),
            ),
            config,
        })
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// Run over full history, as of the latest date in the dataset
    pub fn run(&self, dataset: &Dataset) -> PipelineOutput {
        match dataset.last_date() {
            Some(as_of) => self.run_as_of(dataset, as_of),
            None => PipelineOutput::empty(),
        }
    }

    /// Run using only points dated on or before `as_of`.
    ///
    /// The input is truncated before anything is computed, so later points
    /// cannot influence the result.
    pub fn run_as_of(&self, dataset: &Dataset, as_of: NaiveDate) -> PipelineOutput {
        let view: Cow<'_, Dataset> = match dataset.last_date() {
            Some(last) if last <= as_of => Cow::Borrowed(dataset),
            _ => Cow::Owned(dataset.restricted_to(as_of)),
        };

        if view.is_empty() {
            return PipelineOutput {
                as_of: Some(as_of),
                ..PipelineOutput::empty()
            };
        }

        log::debug!(
            "Running pipeline as of {} over {} entities ({} points)",
            as_of,
            view.len(),
            view.point_count()
        );

        let series: Vec<&EntitySeries> = view.entities().collect();
        let outcomes: Vec<std::result::Result<EntityOutput, ExcludedEntity>> = if self.config.parallel {
            series
                .par_iter()
                .map(|s| self.process_entity(s, as_of))
                .collect()
        } else {
            series
                .iter()
                .map(|s| self.process_entity(s, as_of))
                .collect()
        };

        let mut output = PipelineOutput {
            as_of: Some(as_of),
            entities: Vec::with_capacity(outcomes.len()),
            excluded: Vec::new(),
        };
        for outcome in outcomes {
            match outcome {
                Ok(entity) => output.entities.push(entity),
                Err(excluded) => {
                    log::debug!(
                        "Excluding {} as of {}: grain {}",
                        excluded.entity_id,
                        as_of,
                        excluded.grain
                    );
                    output.excluded.push(excluded);
                }
            }
        }
        output
    }

    /// Process one entity; `Err` carries the reason it was excluded.
    ///
    /// Indicator gaps are filled from the entity's own first observed month
    /// through the as-of month, so a series that starts late is never
    /// backward-filled into months before its first release.
    pub fn process_entity(
        &self,
        series: &EntitySeries,
        as_of: NaiveDate,
    ) -> std::result::Result<EntityOutput, ExcludedEntity> {
        let grain = self.classifier.classify(&series.points, as_of);
        if !grain.is_aggregatable() {
            return Err(ExcludedEntity {
                entity_id: series.entity_id.clone(),
                grain,
            });
        }

        let role = self.config.role_of(&series.category);
        let last_month = YearMonth::of(as_of);
        let observed: Vec<MonthlyValue> = PeriodAggregator::monthly(&series.points)
            .into_iter()
            .filter(|m| m.month <= last_month)
            .collect();
        let first_month = observed.first().map(|m| m.month);
        let monthly = match (role, first_month) {
            (SeriesRole::Indicator, Some(first_month)) => {
                self.interpolator.fill(&observed, first_month, last_month)
            }
            _ => observed,
        };

        let quarters = PeriodAggregator::quarterly(&monthly);
        let forward_returns = self.returns.compute(&series.entity_id, &quarters);
        let changes = match role {
            SeriesRole::Indicator => self.changes.compute(&series.entity_id, &monthly),
            SeriesRole::Market => Vec::new(),
        };

        let months = monthly
            .into_iter()
            .filter_map(|value| {
                forward_returns
                    .for_month(value.month)
                    .map(|quarter| MonthRow { value, quarter })
            })
            .collect();

        Ok(EntityOutput {
            entity_id: series.entity_id.clone(),
            category: series.category.clone(),
            role,
            grain,
            months,
            quarters,
            forward_returns,
            changes,
        })
    }
}
