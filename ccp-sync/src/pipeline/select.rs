//! Row Selector
//!
//! Runs the mode's read query once and turns each store row into a [`Row`].
//! The returned order is authoritative for the rest of the run.

use crate::context::RunContext;
use crate::error::Result;
use crate::models::{Row, StoreRow};
use crate::store::StoreAdapter;
use serde_json::Value;
use tracing::info;

/// Select candidate rows for this run
pub async fn select_rows(ctx: &RunContext, store: &mut dyn StoreAdapter) -> Result<Vec<Row>> {
    let store_rows = store.query(ctx.selection_query()).await?;

    if store_rows.is_empty() && !ctx.mode.is_historical() {
        info!("No new flags in {}", table_label(ctx));
        return Ok(Vec::new());
    }

    info!(rows = store_rows.len(), mode = ?ctx.mode, "Selected rows");
    Ok(store_rows.into_iter().map(|r| to_row(ctx, r)).collect())
}

fn table_label(ctx: &RunContext) -> &str {
    if ctx.sync.table.is_empty() {
        "flag table"
    } else {
        &ctx.sync.table
    }
}

fn to_row(ctx: &RunContext, columns: StoreRow) -> Row {
    let case_id = columns.get(&ctx.sync.case_id_column).and_then(id_text);
    let asset_id = columns
        .get(&ctx.sync.asset_id_column)
        .and_then(id_text)
        .unwrap_or_default();
    let flag_age_hours = columns
        .get(&ctx.sync.flag_age_column)
        .map(hours)
        .unwrap_or(0.0);

    Row {
        case_id,
        asset_id,
        flag_age_hours,
        columns,
    }
}

/// Identifier column as text; null and blank become `None`
fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn hours(value: &Value) -> f64 {
    let h = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    };
    if h.is_finite() {
        h.max(0.0)
    } else {
        0.0
    }
}
