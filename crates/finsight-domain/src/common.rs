//! Shared traits, period math, and calendar helpers.

use std::fmt;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Exposes a stable identifier for entities handled by the engine.
pub trait Identifiable {
    fn id(&self) -> Uuid;
}

/// Provides read-only access to an entity's display name.
pub trait NamedEntity {
    fn name(&self) -> &str;
}

/// Enumerates the period granularities the engine aggregates over.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    #[default]
    Month,
    Year,
}

impl Granularity {
    /// Parses the lowercase labels used by the configuration surface.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "day" | "daily" => Some(Granularity::Day),
            "month" | "monthly" => Some(Granularity::Month),
            "year" | "yearly" => Some(Granularity::Year),
            _ => None,
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Granularity::Day => "Day",
            Granularity::Month => "Month",
            Granularity::Year => "Year",
        };
        f.write_str(label)
    }
}

/// A half-open calendar window `[start, end)` at some granularity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    /// Returns the period of the given granularity that contains `date`.
    pub fn containing(date: NaiveDate, granularity: Granularity) -> Self {
        let start = match granularity {
            Granularity::Day => date,
            Granularity::Month => date.with_day(1).unwrap(),
            Granularity::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap(),
        };
        let end = match granularity {
            Granularity::Day => start + Duration::days(1),
            Granularity::Month => shift_month(start, 1),
            Granularity::Year => NaiveDate::from_ymd_opt(start.year() + 1, 1, 1).unwrap(),
        };
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }

    pub fn next(&self, granularity: Granularity) -> Self {
        Self::containing(self.end, granularity)
    }

    /// Length of the window in whole days.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// A period is closed once its end has been reached.
    pub fn has_closed(&self, now: DateTime<Utc>) -> bool {
        now.date_naive() >= self.end
    }

    /// Enumerates the periods of `granularity` touching `[from, to]`.
    pub fn sequence(from: NaiveDate, to: NaiveDate, granularity: Granularity) -> Vec<Period> {
        let mut periods = Vec::new();
        let mut current = Period::containing(from, granularity);
        while current.start <= to {
            periods.push(current);
            current = current.next(granularity);
        }
        periods
    }

    pub fn label(&self) -> String {
        format!("{}..{}", self.start, self.end)
    }
}

/// An inclusive-start, exclusive-end effective range; `end == None` means open-ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: Option<NaiveDate>) -> Result<Self, DateRangeError> {
        if let Some(end) = end {
            if end <= start {
                return Err(DateRangeError::InvalidRange);
            }
        }
        Ok(Self { start, end })
    }

    pub fn open_ended(start: NaiveDate) -> Self {
        Self { start, end: None }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && self.end.map_or(true, |end| date < end)
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        let self_open = self.end.is_none();
        let other_open = other.end.is_none();
        let before_other_end = other_open || self.start < other.end.unwrap();
        let after_other_start = self_open || other.start < self.end.unwrap();
        before_other_end && after_other_start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateRangeError {
    InvalidRange,
}

impl fmt::Display for DateRangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateRangeError::InvalidRange => f.write_str("range end must be after start"),
        }
    }
}

impl std::error::Error for DateRangeError {}

pub(crate) fn shift_month(date: NaiveDate, months: i32) -> NaiveDate {
    let mut year = date.year();
    let mut month = date.month() as i32 + months;
    while month > 12 {
        month -= 12;
        year += 1;
    }
    while month < 1 {
        month += 12;
        year -= 1;
    }
    let day = date.day().min(days_in_month(year, month as u32));
    NaiveDate::from_ymd_opt(year, month as u32, day).unwrap()
}

pub(crate) fn days_in_month(year: i32, month: u32) -> u32 {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };
    let first_next = NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(year, month, 28).unwrap());
    (first_next - Duration::days(1)).day()
}
