//! Column type inference.
//!
//! A column is classified from up to [`SAMPLE_SIZE`] of its values. Checks run
//! in priority order and the first one matched by *every* sample wins:
//! number, date, boolean, then string.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::models::ColumnType;

/// Number of values inspected per column.
pub const SAMPLE_SIZE: usize = 10;

const BOOLEAN_VALUES: [&str; 6] = ["true", "false", "yes", "no", "1", "0"];

const DATE_FORMATS: [&str; 7] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%d %B %Y",
    "%B %d, %Y",
    "%b %d, %Y",
];

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Infer the type of a column from sample values.
///
/// An empty sample set is `string`.
pub fn infer_type<S: AsRef<str>>(samples: &[S]) -> ColumnType {
    if samples.is_empty() {
        return ColumnType::String;
    }

    if samples.iter().all(|s| is_number(s.as_ref())) {
        ColumnType::Number
    } else if samples.iter().all(|s| parse_date(s.as_ref()).is_some()) {
        ColumnType::Date
    } else if samples.iter().all(|s| is_boolean(s.as_ref())) {
        ColumnType::Boolean
    } else {
        ColumnType::String
    }
}

/// True when the value parses as a finite number.
pub fn is_number(value: &str) -> bool {
    value
        .trim()
        .parse::<f64>()
        .map(|n| n.is_finite())
        .unwrap_or(false)
}

/// True for `true/false/yes/no/1/0`, case-insensitive.
pub fn is_boolean(value: &str) -> bool {
    let lower = value.trim().to_lowercase();
    BOOLEAN_VALUES.contains(&lower.as_str())
}

/// Parse a date in any of the accepted layouts.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.date_naive());
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt.date());
        }
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}
