//! Core types shared across the pipeline

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a market entity (ticker) or an economic series
pub type EntityId = String;

/// Value type (using f64 for precision)
pub type Value = f64;

/// Volume type
pub type Quantity = f64;

/// Percentage change, already multiplied by 100
pub type Pct = f64;

/// A single observation supplied by the ingestion layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub entity_id: EntityId,
    pub date: NaiveDate,
    pub value: Value,
    pub category: String,
    #[serde(default)]
    pub volume: Option<Quantity>,
}

impl TimeSeriesPoint {
    /// Create a new point without volume
    pub fn new(
        entity_id: impl Into<EntityId>,
        date: NaiveDate,
        value: Value,
        category: impl Into<String>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            date,
            value,
            category: category.into(),
            volume: None,
        }
    }

    /// Attach traded volume
    pub fn with_volume(mut self, volume: Quantity) -> Self {
        self.volume = Some(volume);
        self
    }
}

/// Role an entity plays in the correlation join
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesRole {
    /// Economic indicator: gap-filled, source of economic changes
    Indicator,
    /// Market price series: source of forward returns
    Market,
}

/// Grain of a derived aggregate row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodGrain {
    Month,
    Quarter,
}

impl PeriodGrain {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodGrain::Month => "month",
            PeriodGrain::Quarter => "quarter",
        }
    }
}

impl fmt::Display for PeriodGrain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a monthly value was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Observed in the input
    Actual,
    /// Linear interpolation between two observed months
    Interpolated,
    /// Carried forward from the last observed month
    ForwardFilled,
    /// Carried backward from the next observed month
    BackwardFilled,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Actual => "actual",
            Provenance::Interpolated => "interpolated",
            Provenance::ForwardFilled => "forward_filled",
            Provenance::BackwardFilled => "backward_filled",
        }
    }

    pub fn is_actual(&self) -> bool {
        matches!(self, Provenance::Actual)
    }

    /// Parse the `as_str` form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "actual" => Some(Provenance::Actual),
            "interpolated" => Some(Provenance::Interpolated),
            "forward_filled" => Some(Provenance::ForwardFilled),
            "backward_filled" => Some(Provenance::BackwardFilled),
            _ => None,
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Forward-return horizon in quarters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Horizon {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Horizon {
    /// All horizons in ascending order
    pub const ALL: [Horizon; 4] = [Horizon::Q1, Horizon::Q2, Horizon::Q3, Horizon::Q4];

    /// Number of quarters ahead
    pub fn quarters(&self) -> i32 {
        match self {
            Horizon::Q1 => 1,
            Horizon::Q2 => 2,
            Horizon::Q3 => 3,
            Horizon::Q4 => 4,
        }
    }

    /// Position in `Horizon::ALL`
    pub fn index(&self) -> usize {
        (self.quarters() - 1) as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Horizon::Q1 => "Q1",
            Horizon::Q2 => "Q2",
            Horizon::Q3 => "Q3",
            Horizon::Q4 => "Q4",
        }
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Round a percentage to a fixed number of decimals.
///
/// Uses half-away-from-zero rounding, the same as SQL `ROUND`.
pub fn round_pct(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

/// Percentage change from `base` to `current`.
///
/// Returns `None` when the base is zero or either side is not finite.
pub fn pct_change(base: f64, current: f64, precision: u32) -> Option<Pct> {
    if !base.is_finite() || !current.is_finite() || base == 0.0 {
        return None;
    }
    Some(round_pct((current - base) / base * 100.0, precision))
}
