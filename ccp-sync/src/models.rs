//! Data model shared by the pipeline stages

use crate::error::RemoteCallError;
use serde_json::{Map, Value};

/// One row as returned by a store query, columns in select order
pub type StoreRow = Map<String, Value>;

/// Text that stands for a database null once rendered
pub const NULL_MARKER: &str = "NULL";

/// One selected parent record
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Remote case id; `None` when the column is null or blank
    pub case_id: Option<String>,
    /// Local asset id, rendered as text
    pub asset_id: String,
    /// Hours since the row was flagged (0 when absent)
    pub flag_age_hours: f64,
    /// Every selected column, passed through untouched
    pub columns: StoreRow,
}

/// Outcome of the remote call for one row
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteResult {
    /// Parsed response document
    Fetched(Value),
    /// Row had no case id, no call was made
    Skipped,
    /// Call failed; treated as "no usable data"
    Failed(RemoteCallError),
}

impl RemoteResult {
    pub fn response(&self) -> Option<&Value> {
        match self {
            RemoteResult::Fetched(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RemoteResult::Failed(_))
    }
}

/// A normalized scalar ready for SQL rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Null,
    Text(String),
}

impl SqlValue {
    pub fn text(value: impl Into<String>) -> Self {
        SqlValue::Text(value.into())
    }

    /// Render as a SQL literal: `NULL`, or single-quoted with embedded quotes doubled
    pub fn to_literal(&self) -> String {
        match self {
            SqlValue::Text(t) if t != NULL_MARKER => format!("'{}'", t.replace('\'', "''")),
            _ => NULL_MARKER.to_string(),
        }
    }
}

/// Field map after value coercion, in source field order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedRecord {
    fields: Vec<(String, SqlValue)>,
}

impl NormalizedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing in place when the key already exists
    pub fn set(&mut self, key: impl Into<String>, value: SqlValue) {
        let key = key.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&SqlValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A row that survived the inclusion policy
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedRow {
    pub row: Row,
    /// Records extracted for this row; zero means "still flagged, no children yet"
    pub record_count: usize,
}

/// One stored-procedure invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub text: String,
    /// Records carried in the value list
    pub records: usize,
    /// Asset ids carried in the trailer
    pub asset_ids: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_doubles_quotes() {
        assert_eq!(SqlValue::text("O'Brien").to_literal(), "'O''Brien'");
    }

    #[test]
    fn test_null_marker_literal_is_bare() {
        assert_eq!(SqlValue::Null.to_literal(), "NULL");
        assert_eq!(SqlValue::text("NULL").to_literal(), "NULL");
    }

    #[test]
    fn test_record_set_replaces_in_place() {
        let mut record = NormalizedRecord::new();
        record.set("AssetID", SqlValue::text("1"));
        record.set("name", SqlValue::text("a"));
        record.set("AssetID", SqlValue::text("2"));

        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["AssetID", "name"]);
        assert_eq!(record.get("AssetID"), Some(&SqlValue::text("2")));
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn test_remote_result_response() {
        assert!(RemoteResult::Skipped.response().is_none());
        assert!(RemoteResult::Failed(RemoteCallError::Network("x".into())).is_failed());
        assert_eq!(
            RemoteResult::Fetched(Value::Null).response(),
            Some(&Value::Null)
        );
    }
}
