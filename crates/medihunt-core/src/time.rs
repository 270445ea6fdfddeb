//! Date handling for slot searches.
//!
//! The slots endpoint is queried one calendar day at a time; [`DateRange`]
//! produces those days and [`format_query_date`] renders them the way the
//! `StartTime` parameter expects.

use chrono::{Duration, Local, NaiveDate};
use thiserror::Error;

/// Date format used on the command line and in search queries.
pub const QUERY_DATE_FORMAT: &str = "%Y-%m-%d";

/// Errors produced while parsing dates.
#[derive(Debug, Error)]
pub enum TimeError {
    /// The input is not a `YYYY-MM-DD` date.
    #[error("invalid date '{input}': expected YYYY-MM-DD")]
    InvalidDate {
        input: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Parses a `YYYY-MM-DD` date.
pub fn parse_date(input: &str) -> Result<NaiveDate, TimeError> {
    NaiveDate::parse_from_str(input.trim(), QUERY_DATE_FORMAT).map_err(|source| {
        TimeError::InvalidDate {
            input: input.to_string(),
            source,
        }
    })
}

/// Renders a date for the `StartTime` query parameter.
pub fn format_query_date(date: NaiveDate) -> String {
    date.format(QUERY_DATE_FORMAT).to_string()
}

/// Today's date in the local timezone.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// An inclusive range of consecutive days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    days: u32,
}

impl DateRange {
    /// Creates a range of `days` days starting at `start`.
    ///
    /// A range always covers at least one day.
    pub fn new(start: NaiveDate, days: u32) -> Self {
        Self {
            start,
            days: days.max(1),
        }
    }

    /// First day of the range.
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Number of days covered.
    pub fn days(&self) -> u32 {
        self.days
    }

    /// Last day of the range (inclusive).
    pub fn end(&self) -> NaiveDate {
        self.start + Duration::days(i64::from(self.days) - 1)
    }

    /// Returns true if `date` falls within the range.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end()
    }

    /// Iterates over every day in the range, in order.
    pub fn iter(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let start = self.start;
        (0..i64::from(self.days)).map(move |offset| start + Duration::days(offset))
    }
}

impl IntoIterator for DateRange {
    type Item = NaiveDate;
    type IntoIter = std::vec::IntoIter<NaiveDate>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter().collect::<Vec<_>>().into_iter()
    }
}
