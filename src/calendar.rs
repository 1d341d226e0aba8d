//! Period calendar: month and quarter keys and the arithmetic between them
//!
//! All period math goes through calendar arithmetic rather than "next row"
//! lookups, so a missing quarter never shifts a horizon onto the wrong period.

use crate::error::{AnalyticsError, Result};
use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A calendar month
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    /// Create a month key, validating the month number
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(AnalyticsError::ConfigError(format!(
                "Invalid month {} for year {}",
                month, year
            )));
        }
        Ok(Self { year, month })
    }

    /// Month containing a date
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// First day of the month
    pub fn first_day(&self) -> NaiveDate {
        // year/month always come from a valid date or were validated
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// Months since year 0, used for ordinal arithmetic
    fn ordinal(&self) -> i64 {
        self.year as i64 * 12 + (self.month as i64 - 1)
    }

    fn from_ordinal(ordinal: i64) -> Self {
        Self {
            year: ordinal.div_euclid(12) as i32,
            month: (ordinal.rem_euclid(12) + 1) as u32,
        }
    }

    /// Shift by a signed number of months
    pub fn add_months(&self, months: i64) -> Self {
        Self::from_ordinal(self.ordinal() + months)
    }

    pub fn next(&self) -> Self {
        self.add_months(1)
    }

    pub fn prev(&self) -> Self {
        self.add_months(-1)
    }

    /// Signed number of months from `self` to `other`
    pub fn months_until(&self, other: YearMonth) -> i64 {
        other.ordinal() - self.ordinal()
    }

    /// Quarter containing this month
    pub fn quarter(&self) -> YearQuarter {
        YearQuarter {
            year: self.year,
            quarter: (self.month - 1) / 3 + 1,
        }
    }

    /// Inclusive range of months between two keys
    pub fn range_inclusive(start: YearMonth, end: YearMonth) -> Vec<YearMonth> {
        let count = start.months_until(end);
        if count < 0 {
            return Vec::new();
        }
        (0..=count).map(|offset| start.add_months(offset)).collect()
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// A calendar quarter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct YearQuarter {
    pub year: i32,
    pub quarter: u32,
}

impl YearQuarter {
    pub fn new(year: i32, quarter: u32) -> Result<Self> {
        if !(1..=4).contains(&quarter) {
            return Err(AnalyticsError::ConfigError(format!(
                "Invalid quarter {} for year {}",
                quarter, year
            )));
        }
        Ok(Self { year, quarter })
    }

    /// Quarter containing a date
    pub fn of(date: NaiveDate) -> Self {
        YearMonth::of(date).quarter()
    }

    fn ordinal(&self) -> i64 {
        self.year as i64 * 4 + (self.quarter as i64 - 1)
    }

    /// Shift by a signed number of quarters
    pub fn add_quarters(&self, quarters: i64) -> Self {
        let ordinal = self.ordinal() + quarters;
        Self {
            year: ordinal.div_euclid(4) as i32,
            quarter: (ordinal.rem_euclid(4) + 1) as u32,
        }
    }

    /// First month of the quarter
    pub fn first_month(&self) -> YearMonth {
        YearMonth {
            year: self.year,
            month: (self.quarter - 1) * 3 + 1,
        }
    }

    /// The three months of the quarter
    pub fn months(&self) -> [YearMonth; 3] {
        let first = self.first_month();
        [first, first.add_months(1), first.add_months(2)]
    }

    /// First day of the quarter, used as the quarter's period date
    pub fn first_day(&self) -> NaiveDate {
        self.first_month().first_day()
    }

    /// Last day of the quarter
    pub fn last_day(&self) -> NaiveDate {
        self.add_quarters(1)
            .first_day()
            .pred_opt()
            .unwrap_or(NaiveDate::MAX)
    }
}

impl fmt::Display for YearQuarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-Q{}", self.year, self.quarter)
    }
}

/// Start of a trailing window of `months` months ending at `as_of`.
///
/// The window is `(start, as_of]`; a point dated exactly `start` is outside it.
pub fn trailing_window_start(as_of: NaiveDate, months: u32) -> NaiveDate {
    as_of
        .checked_sub_months(Months::new(months))
        .unwrap_or(NaiveDate::MIN)
}

/// First-of-month anchor dates between two dates (inclusive)
pub fn month_start_anchors(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut first = YearMonth::of(start);
    if first.first_day() < start {
        first = first.next();
    }
    YearMonth::range_inclusive(first, YearMonth::of(end))
        .into_iter()
        .map(|m| m.first_day())
        .filter(|d| *d <= end)
        .collect()
}

/// Last-day-of-quarter anchor dates between two dates (inclusive)
pub fn quarter_end_anchors(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut anchors = Vec::new();
    let mut quarter = YearQuarter::of(start);
    while quarter.first_day() <= end {
        let last = quarter.last_day();
        if last >= start && last <= end {
            anchors.push(last);
        }
        quarter = quarter.add_quarters(1);
    }
    anchors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_month_arithmetic_crosses_years() {
        let dec = YearMonth::new(2023, 12).unwrap();
        assert_eq!(dec.next(), YearMonth::new(2024, 1).unwrap());
        assert_eq!(dec.add_months(-12), YearMonth::new(2022, 12).unwrap());
        assert_eq!(dec.months_until(YearMonth::new(2024, 3).unwrap()), 3);
    }

    #[test]
    fn test_quarter_of_month() {
        assert_eq!(YearMonth::of(date(2024, 2, 15)).quarter(), YearQuarter::new(2024, 1).unwrap());
        assert_eq!(YearMonth::of(date(2024, 12, 31)).quarter(), YearQuarter::new(2024, 4).unwrap());
    }

    #[test]
    fn test_quarter_arithmetic() {
        let q4 = YearQuarter::new(2023, 4).unwrap();
        assert_eq!(q4.add_quarters(1), YearQuarter::new(2024, 1).unwrap());
        assert_eq!(q4.add_quarters(4), YearQuarter::new(2024, 4).unwrap());
        assert_eq!(q4.add_quarters(-4), YearQuarter::new(2022, 4).unwrap());
        assert_eq!(q4.last_day(), date(2023, 12, 31));
        assert_eq!(q4.first_day(), date(2023, 10, 1));
    }

    #[test]
    fn test_invalid_keys_rejected() {
        assert!(YearMonth::new(2024, 13).is_err());
        assert!(YearQuarter::new(2024, 0).is_err());
    }

    #[test]
    fn test_trailing_window_start() {
        assert_eq!(trailing_window_start(date(2024, 3, 31), 12), date(2023, 3, 31));
    }

    #[test]
    fn test_month_start_anchors() {
        let anchors = month_start_anchors(date(2024, 1, 15), date(2024, 4, 1));
        assert_eq!(anchors, vec![date(2024, 2, 1), date(2024, 3, 1), date(2024, 4, 1)]);
    }

    #[test]
    fn test_quarter_end_anchors() {
        let anchors = quarter_end_anchors(date(2024, 1, 1), date(2024, 9, 30));
        assert_eq!(anchors, vec![date(2024, 3, 31), date(2024, 6, 30), date(2024, 9, 30)]);
    }
}
