//! Compact `yyyyMMdd` dates used on the wire.

use chrono::{Months, NaiveDate, Utc};

/// chrono format string for the wire date format.
pub const COMPACT_DATE_FORMAT: &str = "%Y%m%d";

/// Parse a `yyyyMMdd` date.
///
/// Exactly eight ASCII digits are accepted; separators, signs and surrounding
/// whitespace are rejected even where chrono would be lenient.
pub fn parse_compact_date(value: &str) -> Option<NaiveDate> {
    if value.len() != 8 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(value, COMPACT_DATE_FORMAT).ok()
}

pub fn format_compact_date(date: NaiveDate) -> String {
    date.format(COMPACT_DATE_FORMAT).to_string()
}

/// Current calendar date in UTC.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Add calendar months, clamping to the last day of shorter months
/// (Jan 31 + 1 month = Feb 28/29).
pub fn add_months(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    date.checked_add_months(Months::new(months))
}
