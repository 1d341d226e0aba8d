//! Input time series handling
//!
//! A [`Dataset`] holds validated points grouped by entity. Malformed input is
//! rejected with [`AnalyticsError::SchemaViolation`] rather than coerced.

pub mod frequency;
pub mod interpolate;
pub mod resample;

pub use frequency::{GrainClassifier, SamplingGrain};
pub use interpolate::GapInterpolator;
pub use resample::{MonthlyValue, PeriodAggregate, PeriodAggregator, QuarterlyValue};

use crate::calendar::YearMonth;
use crate::error::{AnalyticsError, Result};
use crate::types::{EntityId, TimeSeriesPoint};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

/// Columns every input table must carry
pub const REQUIRED_COLUMNS: [&str; 4] = ["entity_id", "date", "value", "category"];

/// All points for one entity, ordered by date
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySeries {
    pub entity_id: EntityId,
    pub category: String,
    pub points: Vec<TimeSeriesPoint>,
}

impl EntitySeries {
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }
}

/// Validated input points grouped by entity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    entities: BTreeMap<EntityId, EntitySeries>,
}

impl Dataset {
    /// Create an empty dataset
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and group a batch of points
    pub fn from_points(points: impl IntoIterator<Item = TimeSeriesPoint>) -> Result<Self> {
        let mut dataset = Self::new();
        for (idx, point) in points.into_iter().enumerate() {
            dataset.add_point_at(idx + 1, point)?;
        }
        dataset.sort();
        Ok(dataset)
    }

    /// Read points from CSV with a header row.
    ///
    /// Required columns are `entity_id,date,value,category`; `volume` is
    /// optional. Dates use `YYYY-MM-DD`.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        for column in REQUIRED_COLUMNS {
            if !headers.iter().any(|h| h == column) {
                return Err(AnalyticsError::MissingColumn(column.to_string()));
            }
        }

        let mut dataset = Self::new();
        for (idx, record) in reader.deserialize::<CsvRow>().enumerate() {
            let row = idx + 1;
            let record = record.map_err(|e| AnalyticsError::schema(row, e.to_string()))?;
            dataset.add_point_at(row, record.into_point(row)?)?;
        }
        dataset.sort();
        Ok(dataset)
    }

    /// Read points from a CSV file
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(file)
    }

    /// Validate and insert one point; `row` is used in error messages
    fn add_point_at(&mut self, row: usize, point: TimeSeriesPoint) -> Result<()> {
        if point.entity_id.trim().is_empty() {
            return Err(AnalyticsError::schema(row, "entity_id is empty"));
        }
        if point.category.trim().is_empty() {
            return Err(AnalyticsError::schema(row, "category is empty"));
        }
        if !point.value.is_finite() {
            return Err(AnalyticsError::schema(
                row,
                format!("value for {} on {} is not finite", point.entity_id, point.date),
            ));
        }
        if let Some(volume) = point.volume {
            if !volume.is_finite() || volume < 0.0 {
                return Err(AnalyticsError::schema(
                    row,
                    format!("volume for {} on {} is invalid: {}", point.entity_id, point.date, volume),
                ));
            }
        }

        match self.entities.get_mut(&point.entity_id) {
            Some(series) => {
                if series.category != point.category {
                    return Err(AnalyticsError::schema(
                        row,
                        format!(
                            "entity {} appears under categories {} and {}",
                            point.entity_id, series.category, point.category
                        ),
                    ));
                }
                series.points.push(point);
            }
            None => {
                self.entities.insert(
                    point.entity_id.clone(),
                    EntitySeries {
                        entity_id: point.entity_id.clone(),
                        category: point.category.clone(),
                        points: vec![point],
                    },
                );
            }
        }
        Ok(())
    }

    fn sort(&mut self) {
        for series in self.entities.values_mut() {
            series.points.sort_by_key(|p| p.date);
        }
    }

    /// View containing only points dated on or before `as_of`.
    ///
    /// Entities left without points are dropped.
    pub fn restricted_to(&self, as_of: NaiveDate) -> Dataset {
        let entities = self
            .entities
            .iter()
            .filter_map(|(id, series)| {
                let points: Vec<TimeSeriesPoint> = series
                    .points
                    .iter()
                    .take_while(|p| p.date <= as_of)
                    .cloned()
                    .collect();
                if points.is_empty() {
                    None
                } else {
                    Some((
                        id.clone(),
                        EntitySeries {
                            entity_id: series.entity_id.clone(),
                            category: series.category.clone(),
                            points,
                        },
                    ))
                }
            })
            .collect();
        Dataset { entities }
    }

    /// View containing only the given categories
    pub fn with_categories(&self, categories: &[&str]) -> Dataset {
        let entities = self
            .entities
            .iter()
            .filter(|(_, series)| categories.contains(&series.category.as_str()))
            .map(|(id, series)| (id.clone(), series.clone()))
            .collect();
        Dataset { entities }
    }

    /// Entities ordered by id
    pub fn entities(&self) -> impl Iterator<Item = &EntitySeries> {
        self.entities.values()
    }

    pub fn entity(&self, entity_id: &str) -> Option<&EntitySeries> {
        self.entities.get(entity_id)
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Total number of points across entities
    pub fn point_count(&self) -> usize {
        self.entities.values().map(|s| s.points.len()).sum()
    }

    /// Earliest date in the dataset
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.entities.values().filter_map(|s| s.first_date()).min()
    }

    /// Latest date in the dataset
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.entities.values().filter_map(|s| s.last_date()).max()
    }

    /// Month span covered by the dataset
    pub fn month_span(&self) -> Option<(YearMonth, YearMonth)> {
        match (self.first_date(), self.last_date()) {
            (Some(first), Some(last)) => Some((YearMonth::of(first), YearMonth::of(last))),
            _ => None,
        }
    }
}

/// Raw CSV row before validation
#[derive(Debug, Deserialize)]
struct CsvRow {
    entity_id: String,
    date: String,
    value: String,
    category: String,
    #[serde(default)]
    volume: Option<String>,
}

impl CsvRow {
    fn into_point(self, row: usize) -> Result<TimeSeriesPoint> {
        let date = NaiveDate::parse_from_str(&self.date, "%Y-%m-%d")
            .map_err(|e| AnalyticsError::schema(row, format!("invalid date '{}': {}", self.date, e)))?;
        let value: f64 = self
            .value
            .parse()
            .map_err(|_| AnalyticsError::schema(row, format!("invalid value '{}'", self.value)))?;
        let volume = match self.volume.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(
                raw.parse::<f64>()
                    .map_err(|_| AnalyticsError::schema(row, format!("invalid volume '{}'", raw)))?,
            ),
        };

        Ok(TimeSeriesPoint {
            entity_id: self.entity_id,
            date,
            value,
            category: self.category,
            volume,
        })
    }
}
