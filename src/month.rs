use chrono::{Datelike, Month, NaiveDate};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// A per-calendar-month member table. The store name is `<month>_<year>`,
/// e.g. `december_2025`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthTable {
    year: i32,
    month: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("`{0}` is not a monthly table name (expected e.g. december_2025)")]
pub struct ParseMonthTableError(pub String);

impl MonthTable {
    /// `month` is 1-based.
    pub fn new(month: u32, year: i32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// Accepts full or abbreviated English month names, any case.
    pub fn from_name(month_name: &str, year: i32) -> Option<Self> {
        let month = month_name.trim().parse::<Month>().ok()?;
        Self::new(month.number_from_month(), year)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn month_name(&self) -> &'static str {
        u8::try_from(self.month)
            .ok()
            .and_then(|m| Month::try_from(m).ok())
            .map(|m| m.name())
            .unwrap_or("Unknown")
    }

    pub fn table_name(&self) -> String {
        format!("{}_{}", self.month_name().to_lowercase(), self.year)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    pub fn date_for_day(&self, day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, day)
    }
}

impl fmt::Display for MonthTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.table_name())
    }
}

impl FromStr for MonthTable {
    type Err = ParseMonthTableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseMonthTableError(s.to_string());
        let (month, year) = s.trim().rsplit_once('_').ok_or_else(err)?;
        let year: i32 = year.parse().map_err(|_| err())?;
        if !(1000..=9999).contains(&year) {
            return Err(err());
        }
        MonthTable::from_name(month, year).ok_or_else(err)
    }
}

/// Joins table names for multi-table file names: `may_2025_june_2025`.
pub fn join_table_names(tables: &[MonthTable]) -> String {
    tables
        .iter()
        .map(MonthTable::table_name)
        .collect::<Vec<_>>()
        .join("_")
}
