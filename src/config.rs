//! Analytics configuration
//!
//! Every threshold the pipeline uses is supplied here rather than hard-coded.
//! The struct deserializes from TOML; missing keys fall back to the defaults.

use crate::error::{AnalyticsError, Result};
use crate::types::SeriesRole;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which economic change column feeds the correlation join
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeWindow {
    /// Month-over-month percentage change
    MonthOverMonth,
    /// Percentage change against the value N months earlier
    Months(u32),
}

impl Default for ChangeWindow {
    fn default() -> Self {
        ChangeWindow::MonthOverMonth
    }
}

/// Configuration for a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Trailing window used by the grain classifier
    pub grain_window_months: u32,
    /// Categories treated as economic indicators (gap-filled, correlated against)
    pub indicator_categories: Vec<String>,
    /// Maximum forward/backward fill distance in months; `None` is unlimited
    pub fill_limit_months: Option<u32>,
    /// Number of buckets for change ranking
    pub quintile_count: usize,
    /// Rolling delta windows reported for indicator series
    pub delta_windows: Vec<u32>,
    /// Economic change column used by the correlation analyzer
    pub change_window: ChangeWindow,
    /// Minimum paired observations before a correlation is reported
    pub min_correlation_observations: usize,
    /// Minimum observations before a bucket mean is reported
    pub min_bucket_observations: usize,
    /// Decimal places for percentage outputs
    pub return_precision: u32,
    /// Share of exact-zero forward returns above which the audit warns
    pub zero_return_warn_ratio: f64,
    /// Horizons in months for realized backtest returns
    pub backtest_periods: Vec<u32>,
    /// Entity backtest returns are measured against
    pub benchmark_entity: String,
    /// Process entities and anchors on the rayon pool
    pub parallel: bool,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            grain_window_months: 12,
            indicator_categories: vec!["economic_indicator".to_string()],
            fill_limit_months: None,
            quintile_count: 5,
            delta_windows: vec![3, 6, 12],
            change_window: ChangeWindow::MonthOverMonth,
            min_correlation_observations: 10,
            min_bucket_observations: 3,
            return_precision: 2,
            zero_return_warn_ratio: 0.5,
            backtest_periods: vec![1, 3, 6],
            benchmark_entity: "SPY".to_string(),
            parallel: true,
        }
    }
}

impl AnalyticsConfig {
    /// Parse a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Check the configuration for values the pipeline cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.grain_window_months == 0 {
            return Err(AnalyticsError::ConfigError(
                "grain_window_months must be greater than 0".to_string(),
            ));
        }
        if self.quintile_count < 2 {
            return Err(AnalyticsError::ConfigError(
                "quintile_count must be at least 2".to_string(),
            ));
        }
        if self.min_correlation_observations < 3 {
            return Err(AnalyticsError::ConfigError(
                "min_correlation_observations must be at least 3".to_string(),
            ));
        }
        if self.min_bucket_observations == 0 {
            return Err(AnalyticsError::ConfigError(
                "min_bucket_observations must be greater than 0".to_string(),
            ));
        }
        if self.delta_windows.iter().any(|w| *w == 0) {
            return Err(AnalyticsError::ConfigError(
                "delta_windows entries must be greater than 0".to_string(),
            ));
        }
        if let ChangeWindow::Months(months) = self.change_window {
            if !self.delta_windows.contains(&months) {
                return Err(AnalyticsError::ConfigError(format!(
                    "change_window of {} months is not one of delta_windows {:?}",
                    months, self.delta_windows
                )));
            }
        }
        if self.backtest_periods.iter().any(|p| *p == 0) {
            return Err(AnalyticsError::ConfigError(
                "backtest_periods entries must be greater than 0".to_string(),
            ));
        }
        if self.benchmark_entity.trim().is_empty() {
            return Err(AnalyticsError::ConfigError(
                "benchmark_entity must not be empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.zero_return_warn_ratio) {
            return Err(AnalyticsError::ConfigError(
                "zero_return_warn_ratio must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }

    /// Role of an entity given its category
    pub fn role_of(&self, category: &str) -> SeriesRole {
        if self.indicator_categories.iter().any(|c| c == category) {
            SeriesRole::Indicator
        } else {
            SeriesRole::Market
        }
    }
}
