//! Extractor/Validator
//!
//! Descends each response through the SOAP envelope, applies the navigation
//! keys, pairs the resulting list with its row by position, applies the
//! inclusion policy and normalizes every surviving element.

use super::normalize::normalize_record;
use crate::context::RunContext;
use crate::error::{Result, SyncError};
use crate::models::{MatchedRow, NormalizedRecord, RemoteResult, Row};
use serde_json::Value;
use tracing::{debug, info};

/// Output of the extraction stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Normalized records in row order
    pub records: Vec<NormalizedRecord>,
    /// Rows that passed the inclusion policy
    pub matched: Vec<MatchedRow>,
}

/// Extract, filter and normalize the records for a run
pub fn extract(ctx: &RunContext, rows: &[Row], results: &[RemoteResult]) -> Result<Extraction> {
    if rows.len() != results.len() {
        return Err(SyncError::Processing(format!(
            "{} remote results for {} rows",
            results.len(),
            rows.len()
        )));
    }

    let mut extraction = Extraction::default();

    for (row, result) in rows.iter().zip(results) {
        let items: Vec<Value> = match result.response() {
            Some(document) => {
                let value = return_value(ctx, document)?;
                navigate(value, &ctx.remote.navigation_keys)?
            }
            None => Vec::new(),
        }
        .into_iter()
        .filter(is_truthy)
        .collect();

        if !is_included(ctx, row, items.is_empty()) {
            info!(
                "{} / {} -> no child cases but less than {} hours",
                row.asset_id,
                row.case_id.as_deref().unwrap_or("N/A"),
                ctx.sync.flag_hour_limit
            );
            continue;
        }

        let record_count = items.len();
        for item in items {
            extraction.records.push(to_record(ctx, row, item)?);
        }
        debug!(asset_id = %row.asset_id, records = record_count, "Row matched");
        extraction.matched.push(MatchedRow {
            row: row.clone(),
            record_count,
        });
    }

    Ok(extraction)
}

/// Inclusion policy: in normal mode, rows with no data are held back until
/// they have been flagged for `flag_hour_limit` hours
pub fn is_included(ctx: &RunContext, row: &Row, no_data: bool) -> bool {
    ctx.mode.is_historical() || !no_data || row.flag_age_hours >= ctx.sync.flag_hour_limit
}

fn to_record(ctx: &RunContext, row: &Row, item: Value) -> Result<NormalizedRecord> {
    let mut fields = match item {
        Value::Object(fields) => fields,
        other => {
            return Err(SyncError::Processing(format!(
                "expected a map of fields for asset {}, got {}",
                row.asset_id, other
            )))
        }
    };
    fields.insert(
        ctx.sync.asset_id_column.clone(),
        Value::String(row.asset_id.clone()),
    );
    normalize_record(&fields)
}

/// Descend envelope → body → response wrapper → return value
fn return_value(ctx: &RunContext, document: &Value) -> Result<Value> {
    let remote = &ctx.remote;
    let wrapper = remote.response_wrapper_key();
    let path = [
        remote.envelope_key.as_str(),
        remote.body_key.as_str(),
        wrapper.as_str(),
        remote.return_key.as_str(),
    ];

    let mut node = document;
    for key in path {
        node = match node.get(key) {
            Some(next) => next,
            None => return Err(envelope_mismatch(ctx, document, key)),
        };
    }
    Ok(node.clone())
}

fn envelope_mismatch(ctx: &RunContext, document: &Value, missing: &str) -> SyncError {
    let mut msg = format!("response has no '{}' element", missing);
    if let Some(fault) = fault_text(ctx, document) {
        msg.push_str(": ");
        msg.push_str(&fault);
    }
    SyncError::Processing(msg)
}

/// Fault string declared by the remote service, if any
fn fault_text(ctx: &RunContext, document: &Value) -> Option<String> {
    let remote = &ctx.remote;
    let fault = document
        .get(&remote.envelope_key)?
        .get(&remote.body_key)?
        .get(&remote.fault_key)?
        .get(&remote.fault_string_key)?;

    match fault {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("#text").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// Apply navigation keys in order; each key narrows the previous step
fn navigate(value: Value, keys: &[String]) -> Result<Vec<Value>> {
    let mut nodes = to_list(value);

    for key in keys {
        let mut next = Vec::new();
        for node in nodes {
            match node {
                Value::Object(mut map) => match map.remove(key) {
                    None | Some(Value::Null) => {}
                    Some(Value::Array(items)) => {
                        next.extend(items.into_iter().map(|item| project(item, key)))
                    }
                    Some(other) => next.push(other),
                },
                Value::Null => {}
                other => {
                    return Err(SyncError::Processing(format!(
                        "cannot navigate '{}' into {}",
                        key, other
                    )))
                }
            }
        }
        nodes = next;
    }

    Ok(nodes)
}

/// A list member that carries `key` is replaced by that field
fn project(item: Value, key: &str) -> Value {
    match item {
        Value::Object(mut map) => match map.remove(key) {
            Some(inner) => inner,
            None => Value::Object(map),
        },
        other => other,
    }
}

fn to_list(value: Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        other => vec![other],
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Bool(b) => *b,
        Value::Number(_) => true,
    }
}
