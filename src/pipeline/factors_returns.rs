//! Return factors - forward returns, economic changes and realized backtest returns
//!
//! Forward returns are computed once per quarter from quarterly aggregates.
//! Month rows never compute their own value; they hold an `Arc` to the
//! quarter's record, so every month of a quarter reports the same return.

use crate::calendar::{YearMonth, YearQuarter};
use crate::config::ChangeWindow;
use crate::data::resample::{MonthlyValue, QuarterlyValue};
use crate::types::{pct_change, round_pct, EntityId, Horizon, Pct, Provenance, Value};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Output relation row: one quarter, one horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardReturnRecord {
    pub entity_id: EntityId,
    pub period_date: NaiveDate,
    pub horizon: Horizon,
    pub pct_change: Option<Pct>,
}

/// Forward returns of one quarter across all horizons
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarterForwardReturns {
    pub entity_id: EntityId,
    pub quarter: YearQuarter,
    pub avg_value: Value,
    returns: [Option<Pct>; 4],
}

impl QuarterForwardReturns {
    /// Return for a horizon; `None` when the forward quarter is missing
    pub fn get(&self, horizon: Horizon) -> Option<Pct> {
        self.returns[horizon.index()]
    }

    pub fn returns(&self) -> &[Option<Pct>; 4] {
        &self.returns
    }

    pub fn period_date(&self) -> NaiveDate {
        self.quarter.first_day()
    }

    /// Flatten into one record per horizon
    pub fn records(&self) -> Vec<ForwardReturnRecord> {
        Horizon::ALL
            .iter()
            .map(|&horizon| ForwardReturnRecord {
                entity_id: self.entity_id.clone(),
                period_date: self.period_date(),
                horizon,
                pct_change: self.get(horizon),
            })
            .collect()
    }
}

/// Canonical per-quarter forward returns for one entity
#[derive(Debug, Clone, Default)]
pub struct ForwardReturnTable {
    by_quarter: BTreeMap<YearQuarter, Arc<QuarterForwardReturns>>,
}

impl ForwardReturnTable {
    /// Shared record for the quarter containing `month`
    pub fn for_month(&self, month: YearMonth) -> Option<Arc<QuarterForwardReturns>> {
        self.by_quarter.get(&month.quarter()).cloned()
    }

    pub fn for_quarter(&self, quarter: YearQuarter) -> Option<&Arc<QuarterForwardReturns>> {
        self.by_quarter.get(&quarter)
    }

    /// Quarter records ordered by quarter
    pub fn quarters(&self) -> impl Iterator<Item = &Arc<QuarterForwardReturns>> {
        self.by_quarter.values()
    }

    pub fn len(&self) -> usize {
        self.by_quarter.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_quarter.is_empty()
    }

    /// All records flattened, ordered by quarter then horizon
    pub fn records(&self) -> Vec<ForwardReturnRecord> {
        self.by_quarter.values().flat_map(|q| q.records()).collect()
    }
}

/// Computes 1-4 quarter forward returns from quarterly aggregates
#[derive(Debug, Clone, Copy)]
pub struct ForwardReturnCalculator {
    precision: u32,
}

impl ForwardReturnCalculator {
    pub fn new(precision: u32) -> Self {
        Self { precision }
    }

    /// Build the forward-return table for one entity.
    ///
    /// The forward aggregate is looked up by calendar quarter, so a gap in
    /// the quarterly series yields a null rather than a return against
    /// whichever quarter happens to come next.
    pub fn compute(&self, entity_id: &str, quarters: &[QuarterlyValue]) -> ForwardReturnTable {
        let by_quarter: BTreeMap<YearQuarter, f64> =
            quarters.iter().map(|q| (q.quarter, q.avg_value)).collect();

        let table = by_quarter
            .iter()
            .map(|(&quarter, &current)| {
                let mut returns = [None; 4];
                for horizon in Horizon::ALL {
                    returns[horizon.index()] = by_quarter
                        .get(&quarter.add_quarters(horizon.quarters() as i64))
                        .and_then(|&future| pct_change(current, future, self.precision));
                }
                (
                    quarter,
                    Arc::new(QuarterForwardReturns {
                        entity_id: entity_id.to_string(),
                        quarter,
                        avg_value: current,
                        returns,
                    }),
                )
            })
            .collect();

        ForwardReturnTable { by_quarter: table }
    }
}

impl Default for ForwardReturnCalculator {
    fn default() -> Self {
        Self::new(2)
    }
}

/// Percentage change of an indicator against N months earlier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowDelta {
    pub months: u32,
    pub pct: Option<Pct>,
}

/// Monthly economic change row for one indicator series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomicChange {
    pub series_id: EntityId,
    pub period_date: NaiveDate,
    pub value: Value,
    pub provenance: Provenance,
    pub mom_pct: Option<Pct>,
    pub deltas: Vec<WindowDelta>,
}

impl EconomicChange {
    pub fn month(&self) -> YearMonth {
        YearMonth::of(self.period_date)
    }

    /// Change column selected by `window`
    pub fn change(&self, window: ChangeWindow) -> Option<Pct> {
        match window {
            ChangeWindow::MonthOverMonth => self.mom_pct,
            ChangeWindow::Months(months) => self
                .deltas
                .iter()
                .find(|d| d.months == months)
                .and_then(|d| d.pct),
        }
    }
}

/// Computes month-over-month and rolling-window changes for indicator series
#[derive(Debug, Clone)]
pub struct EconomicChangeCalculator {
    precision: u32,
    windows: Vec<u32>,
}

impl EconomicChangeCalculator {
    pub fn new(precision: u32, windows: Vec<u32>) -> Self {
        Self { precision, windows }
    }

    /// Changes for every month of a (gap-filled) monthly series
    pub fn compute(&self, series_id: &str, months: &[MonthlyValue]) -> Vec<EconomicChange> {
        let by_month: BTreeMap<YearMonth, f64> =
            months.iter().map(|m| (m.month, m.avg_value)).collect();
        let lagged = |month: YearMonth, lag: u32, current: f64| {
            by_month
                .get(&month.add_months(-(lag as i64)))
                .and_then(|&base| pct_change(base, current, self.precision))
        };

        months
            .iter()
            .map(|m| EconomicChange {
                series_id: series_id.to_string(),
                period_date: m.month.first_day(),
                value: m.avg_value,
                provenance: m.provenance,
                mom_pct: lagged(m.month, 1, m.avg_value),
                deltas: self
                    .windows
                    .iter()
                    .map(|&window| WindowDelta {
                        months: window,
                        pct: lagged(m.month, window, m.avg_value),
                    })
                    .collect(),
            })
            .collect()
    }
}

impl Default for EconomicChangeCalculator {
    fn default() -> Self {
        Self::new(2, vec![3, 6, 12])
    }
}

/// Realized return over one period, next to the benchmark's
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealizedReturn {
    pub months: u32,
    pub actual_return: Option<Pct>,
    pub benchmark_return: Option<Pct>,
    /// `actual_return - benchmark_return`; null when either side is
    pub outperformance: Option<Pct>,
}

/// Realized returns of one entity from a backtest month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReturns {
    pub entity_id: EntityId,
    pub benchmark_id: EntityId,
    pub backtest_month: NaiveDate,
    pub returns: Vec<RealizedReturn>,
}

impl BacktestReturns {
    pub fn period(&self, months: u32) -> Option<&RealizedReturn> {
        self.returns.iter().find(|r| r.months == months)
    }
}

/// Scores backtests against realized monthly averages.
///
/// The forward level is the average of the calendar month N months ahead.
/// A missing month yields a null, so a symbol with a data hole is never
/// scored as flat.
#[derive(Debug, Clone)]
pub struct RealizedReturnCalculator {
    precision: u32,
    periods: Vec<u32>,
}

impl RealizedReturnCalculator {
    pub fn new(precision: u32, periods: Vec<u32>) -> Self {
        Self { precision, periods }
    }

    /// Change of the monthly average from `from` to `months` later
    pub fn forward(&self, levels: &BTreeMap<YearMonth, Value>, from: YearMonth, months: u32) -> Option<Pct> {
        let base = *levels.get(&from)?;
        let future = *levels.get(&from.add_months(months as i64))?;
        pct_change(base, future, self.precision)
    }

    pub fn score(
        &self,
        entity_id: &str,
        levels: &BTreeMap<YearMonth, Value>,
        benchmark_id: &str,
        benchmark: &BTreeMap<YearMonth, Value>,
        from: YearMonth,
    ) -> BacktestReturns {
        let returns = self
            .periods
            .iter()
            .map(|&months| {
                let actual_return = self.forward(levels, from, months);
                let benchmark_return = self.forward(benchmark, from, months);
                let outperformance = match (actual_return, benchmark_return) {
                    (Some(actual), Some(bench)) => Some(round_pct(actual - bench, self.precision)),
                    _ => None,
                };
                RealizedReturn {
                    months,
                    actual_return,
                    benchmark_return,
                    outperformance,
                }
            })
            .collect();

        BacktestReturns {
            entity_id: entity_id.to_string(),
            benchmark_id: benchmark_id.to_string(),
            backtest_month: from.first_day(),
            returns,
        }
    }
}

impl Default for RealizedReturnCalculator {
    fn default() -> Self {
        Self::new(2, vec![1, 3, 6])
    }
}
