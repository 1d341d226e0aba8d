//! Sampling grain classification
//!
//! An entity's native sampling density is judged from how many observations
//! fall inside a trailing window ending at the run's as-of date.

use crate::calendar::trailing_window_start;
use crate::error::{AnalyticsError, Result};
use crate::types::TimeSeriesPoint;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Native sampling density of a series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingGrain {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Annually,
    /// Too few observations to aggregate meaningfully
    LimitedData,
}

impl SamplingGrain {
    /// Classify by number of observations in a twelve-month window
    pub fn from_count(count: usize) -> Self {
        match count {
            c if c >= 200 => SamplingGrain::Daily,
            c if c >= 50 => SamplingGrain::Weekly,
            c if c >= 9 => SamplingGrain::Monthly,
            c if c >= 2 => SamplingGrain::Quarterly,
            1 => SamplingGrain::Annually,
            _ => SamplingGrain::LimitedData,
        }
    }

    /// Whether period aggregation is meaningful at this grain
    pub fn is_aggregatable(&self) -> bool {
        !matches!(self, SamplingGrain::LimitedData)
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            SamplingGrain::Daily => "daily",
            SamplingGrain::Weekly => "weekly",
            SamplingGrain::Monthly => "monthly",
            SamplingGrain::Quarterly => "quarterly",
            SamplingGrain::Annually => "annually",
            SamplingGrain::LimitedData => "limited_data",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "daily" | "d" => Ok(SamplingGrain::Daily),
            "weekly" | "w" => Ok(SamplingGrain::Weekly),
            "monthly" | "m" => Ok(SamplingGrain::Monthly),
            "quarterly" | "q" => Ok(SamplingGrain::Quarterly),
            "annually" | "annual" | "a" => Ok(SamplingGrain::Annually),
            "limited_data" | "limited" => Ok(SamplingGrain::LimitedData),
            _ => Err(AnalyticsError::ConfigError(format!("Unknown grain: {}", s))),
        }
    }
}

impl fmt::Display for SamplingGrain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classifies a series by its density over a trailing window
#[derive(Debug, Clone, Copy)]
pub struct GrainClassifier {
    window_months: u32,
}

impl GrainClassifier {
    pub fn new(window_months: u32) -> Self {
        Self { window_months }
    }

    pub fn window_months(&self) -> u32 {
        self.window_months
    }

    /// Count points inside `(as_of - window, as_of]`
    pub fn points_in_window(&self, points: &[TimeSeriesPoint], as_of: NaiveDate) -> usize {
        let start = trailing_window_start(as_of, self.window_months);
        points
            .iter()
            .filter(|p| p.date > start && p.date <= as_of)
            .count()
    }

    /// Classify an entity's points as of a date.
    ///
    /// The thresholds are calibrated for a twelve-month window; other window
    /// lengths scale the count back to a twelve-month equivalent.
    pub fn classify(&self, points: &[TimeSeriesPoint], as_of: NaiveDate) -> SamplingGrain {
        let count = self.points_in_window(points, as_of);
        if self.window_months == 12 || count == 0 {
            return SamplingGrain::from_count(count);
        }
        let scaled = (count as f64 * 12.0 / self.window_months as f64).round() as usize;
        SamplingGrain::from_count(scaled.max(1))
    }
}

impl Default for GrainClassifier {
    fn default() -> Self {
        Self::new(12)
    }
}
