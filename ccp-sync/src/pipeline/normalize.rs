//! Value normalization
//!
//! Turns one extracted element into a [`NormalizedRecord`]: nested values and
//! null spellings become [`SqlValue::Null`], date-named fields are coerced to
//! `YYYY-MM-DD HH:MM:SS`, everything else is carried as text.

use crate::error::{Result, SyncError};
use crate::models::{NormalizedRecord, SqlValue, NULL_MARKER};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

/// Canonical timestamp format written to the store
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// Two-digit-year variants come first: chrono's `%Y` also accepts `24` as year 24.
const DATETIME_FORMATS: &[&str] = &[
    "%m/%d/%y %H:%M:%S",
    "%m/%d/%y %H:%M",
    "%m/%d/%y %I:%M:%S %p",
    "%m/%d/%y %I:%M %p",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %I:%M:%S %p",
    "%Y-%m-%d %I:%M %p",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y%m%d %H:%M:%S",
    "%Y%m%d %H:%M",
    "%Y%m%dT%H%M%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%d-%b-%Y %H:%M:%S",
    "%b %d %Y %I:%M%p",
    "%B %d, %Y %H:%M:%S",
    "%B %d, %Y %I:%M %p",
];

const DATE_FORMATS: &[&str] = &[
    "%m/%d/%y",
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%Y%m%d",
    "%d-%b-%Y",
    "%B %d, %Y",
    "%B %d %Y",
    "%d %B %Y",
];

// Anything earlier is a short year that slipped through a `%Y` pattern.
const MIN_YEAR: i32 = 1000;

/// Normalize one element's fields, in source order
pub fn normalize_record(fields: &Map<String, Value>) -> Result<NormalizedRecord> {
    let mut record = NormalizedRecord::new();
    for (key, value) in fields {
        let normalized = if key.contains("date") {
            normalize_date(key, value)?
        } else {
            normalize_value(value)
        };
        record.set(key.clone(), normalized);
    }
    Ok(record)
}

/// Non-date value coercion
pub fn normalize_value(value: &Value) -> SqlValue {
    match value {
        Value::Null | Value::Array(_) | Value::Object(_) => SqlValue::Null,
        Value::String(s) if is_null_spelling(s) => SqlValue::Null,
        Value::String(s) => SqlValue::text(s.as_str()),
        Value::Bool(b) => SqlValue::text(b.to_string()),
        Value::Number(n) => SqlValue::text(n.to_string()),
    }
}

fn is_null_spelling(s: &str) -> bool {
    s == "None" || s == NULL_MARKER
}

fn normalize_date(key: &str, value: &Value) -> Result<SqlValue> {
    let text = match value {
        Value::String(s) => s.trim(),
        Value::Number(_) | Value::Bool(_) => {
            return Err(SyncError::Processing(format!(
                "field '{}' has non-date value {}",
                key, value
            )))
        }
        _ => return Ok(SqlValue::Null),
    };
    if text.is_empty() || is_null_spelling(text) {
        return Ok(SqlValue::Null);
    }

    parse_timestamp(text)
        .map(|ts| SqlValue::Text(ts.format(TIMESTAMP_FORMAT).to_string()))
        .ok_or_else(|| {
            SyncError::Processing(format!("field '{}' has unparseable date '{}'", key, text))
        })
}

/// Lenient mixed-format timestamp parser
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }
    DATETIME_FORMATS
        .iter()
        .filter_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
        .find(|ts| ts.year() >= MIN_YEAR)
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .filter_map(|f| NaiveDate::parse_from_str(text, f).ok())
                .find(|d| d.year() >= MIN_YEAR)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
