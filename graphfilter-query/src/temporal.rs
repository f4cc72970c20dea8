//! Date truncation, date-part extraction and named temporal periods.
//!
//! Shortcuts such as `this_week` are resolved against the compile-time `now`
//! (UTC). Calendar periods are half-open `[start, next_start)`; rolling
//! periods (`past_*`) are closed `[now - n days, now]`.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::value::FilterValue;

/// Truncation granularity for `<field>_trunc` filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncKind {
    /// Start of the year.
    Year,
    /// Start of the quarter.
    Quarter,
    /// Start of the month.
    Month,
    /// Start of the ISO week (Monday).
    Week,
    /// Start of the day.
    Day,
    /// Start of the hour.
    Hour,
}

impl TruncKind {
    /// Every truncation kind.
    pub const ALL: [TruncKind; 6] = [
        Self::Year,
        Self::Quarter,
        Self::Month,
        Self::Week,
        Self::Day,
        Self::Hour,
    ];

    /// Get the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Quarter => "quarter",
            Self::Month => "month",
            Self::Week => "week",
            Self::Day => "day",
            Self::Hour => "hour",
        }
    }

    /// Truncate a timestamp.
    pub fn truncate(&self, dt: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Hour => dt
                .date_naive()
                .and_time(NaiveTime::from_hms_opt(dt.hour(), 0, 0).unwrap_or(NaiveTime::MIN))
                .and_utc(),
            _ => midnight(self.truncate_date(dt.date_naive())),
        }
    }

    /// Truncate a date. `Hour` leaves the date unchanged.
    pub fn truncate_date(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Self::Year => first_of_month(date.year(), 1).unwrap_or(date),
            Self::Quarter => {
                first_of_month(date.year(), (date.month0() / 3) * 3 + 1).unwrap_or(date)
            }
            Self::Month => first_of_month(date.year(), date.month()).unwrap_or(date),
            Self::Week => date - Duration::days(date.weekday().num_days_from_monday() as i64),
            Self::Day | Self::Hour => date,
        }
    }
}

/// Part extracted by `<field>_extract` filters and the `year`/`month`/...
/// leaf operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePart {
    /// Calendar year.
    Year,
    /// Quarter, 1-4.
    Quarter,
    /// Month, 1-12.
    Month,
    /// ISO week number, 1-53.
    Week,
    /// Day of month, 1-31.
    Day,
    /// Day of week, 1 (Sunday) to 7 (Saturday).
    WeekDay,
    /// Hour, 0-23.
    Hour,
    /// Minute, 0-59.
    Minute,
}

impl DatePart {
    /// Every date part.
    pub const ALL: [DatePart; 8] = [
        Self::Year,
        Self::Quarter,
        Self::Month,
        Self::Week,
        Self::Day,
        Self::WeekDay,
        Self::Hour,
        Self::Minute,
    ];

    /// Get the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Quarter => "quarter",
            Self::Month => "month",
            Self::Week => "week",
            Self::Day => "day",
            Self::WeekDay => "week_day",
            Self::Hour => "hour",
            Self::Minute => "minute",
        }
    }

    /// Check if the part needs a time of day.
    pub fn needs_time(&self) -> bool {
        matches!(self, Self::Hour | Self::Minute)
    }

    /// Extract the part from a timestamp.
    pub fn extract(&self, dt: DateTime<Utc>) -> i64 {
        match self {
            Self::Hour => dt.hour() as i64,
            Self::Minute => dt.minute() as i64,
            _ => self.extract_date(dt.date_naive()),
        }
    }

    /// Extract the part from a date. Time parts are zero.
    pub fn extract_date(&self, date: NaiveDate) -> i64 {
        match self {
            Self::Year => date.year() as i64,
            Self::Quarter => (date.month0() / 3 + 1) as i64,
            Self::Month => date.month() as i64,
            Self::Week => date.iso_week().week() as i64,
            Self::Day => date.day() as i64,
            Self::WeekDay => date.weekday().number_from_sunday() as i64,
            Self::Hour | Self::Minute => 0,
        }
    }
}

/// Named temporal shortcut operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemporalShortcut {
    /// The current calendar day.
    Today,
    /// The previous calendar day.
    Yesterday,
    /// The current ISO week.
    ThisWeek,
    /// The last 7 days up to now.
    PastWeek,
    /// The current calendar month.
    ThisMonth,
    /// The last 30 days up to now.
    PastMonth,
    /// The current calendar year.
    ThisYear,
    /// The last 365 days up to now.
    PastYear,
}

impl TemporalShortcut {
    /// Every shortcut.
    pub const ALL: [TemporalShortcut; 8] = [
        Self::Today,
        Self::Yesterday,
        Self::ThisWeek,
        Self::PastWeek,
        Self::ThisMonth,
        Self::PastMonth,
        Self::ThisYear,
        Self::PastYear,
    ];

    /// Parse an operator name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }

    /// Get the operator name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Yesterday => "yesterday",
            Self::ThisWeek => "this_week",
            Self::PastWeek => "past_week",
            Self::ThisMonth => "this_month",
            Self::PastMonth => "past_month",
            Self::ThisYear => "this_year",
            Self::PastYear => "past_year",
        }
    }

    /// Resolve the shortcut against `now`.
    pub fn period(&self, now: DateTime<Utc>) -> Period {
        let today = now.date_naive();
        let calendar = |start: NaiveDate, end: NaiveDate| Period {
            start: midnight(start),
            end: midnight(end),
            end_inclusive: false,
        };
        let rolling = |days: i64| Period {
            start: now - Duration::days(days),
            end: now,
            end_inclusive: true,
        };

        match self {
            Self::Today => calendar(today, today + Duration::days(1)),
            Self::Yesterday => calendar(today - Duration::days(1), today),
            Self::ThisWeek => {
                let start = TruncKind::Week.truncate_date(today);
                calendar(start, start + Duration::days(7))
            }
            Self::ThisMonth => {
                let start = TruncKind::Month.truncate_date(today);
                calendar(start, next_month(start))
            }
            Self::ThisYear => {
                let start = TruncKind::Year.truncate_date(today);
                let end = first_of_month(today.year() + 1, 1).unwrap_or(start);
                calendar(start, end)
            }
            Self::PastWeek => rolling(7),
            Self::PastMonth => rolling(30),
            Self::PastYear => rolling(365),
        }
    }
}

/// A resolved time range. The start is always inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    /// Inclusive lower bound.
    pub start: DateTime<Utc>,
    /// Upper bound.
    pub end: DateTime<Utc>,
    /// Whether the upper bound is inclusive.
    pub end_inclusive: bool,
}

impl Period {
    /// Bounds as operands for a field of the given temporal kind.
    ///
    /// Date fields compare against dates; rolling windows keep their closed
    /// end on the date of `now`.
    pub fn bounds(&self, has_time: bool) -> (FilterValue, FilterValue) {
        if has_time {
            (
                FilterValue::DateTime(self.start),
                FilterValue::DateTime(self.end),
            )
        } else {
            (
                FilterValue::Date(self.start.date_naive()),
                FilterValue::Date(self.end.date_naive()),
            )
        }
    }

    /// Check if a timestamp falls inside the period.
    pub fn contains(&self, dt: DateTime<Utc>) -> bool {
        dt >= self.start && if self.end_inclusive { dt <= self.end } else { dt < self.end }
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn first_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

fn next_month(first: NaiveDate) -> NaiveDate {
    let (year, month) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    first_of_month(year, month).unwrap_or(first)
}
