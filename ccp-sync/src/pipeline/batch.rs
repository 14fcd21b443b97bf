//! Batch Builder
//!
//! Splits normalized records into chunks of at most `insert_limit` and renders
//! each non-empty chunk as one stored-procedure call:
//!
//! ```text
//! EXEC dbo.proc
//! @ColumnString='a,b',@ValueString='(''1'', NULL)',@AssetIDString='7, 9'
//! ```

use crate::context::RunContext;
use crate::models::{Command, MatchedRow, NormalizedRecord, SqlValue, NULL_MARKER};

pub const COLUMN_PARAM: &str = "ColumnString";
pub const VALUE_PARAM: &str = "ValueString";
pub const ASSET_ID_PARAM: &str = "AssetIDString";

/// Named parameters of one call, in render order
#[derive(Debug, Default)]
struct Payload {
    params: Vec<(&'static str, SqlValue)>,
    records: usize,
    asset_ids: usize,
}

/// Contiguous chunks of at most `limit` records; one empty chunk when there
/// are no records
pub fn chunk_records(records: &[NormalizedRecord], limit: usize) -> Vec<&[NormalizedRecord]> {
    if records.is_empty() {
        return vec![records];
    }
    records.chunks(limit.max(1)).collect()
}

/// Build the commands for a run, in execution order
pub fn build_commands(
    ctx: &RunContext,
    records: &[NormalizedRecord],
    matched: &[MatchedRow],
) -> Vec<Command> {
    let mut payloads: Vec<Payload> = chunk_records(records, ctx.sync.insert_limit)
        .into_iter()
        .map(chunk_payload)
        .collect();

    if !ctx.mode.is_historical() {
        let unmatched = unmatched_asset_ids(matched);
        if let Some(last) = payloads.last_mut() {
            if !unmatched.is_empty() {
                last.params
                    .push((ASSET_ID_PARAM, SqlValue::Text(unmatched.join(", "))));
                last.asset_ids = unmatched.len();
            }
        }
    }

    payloads
        .into_iter()
        .filter(|p| !p.params.is_empty())
        .map(|p| Command {
            text: render(&ctx.sync.procedure, &p.params),
            records: p.records,
            asset_ids: p.asset_ids,
        })
        .collect()
}

/// Asset ids of rows that were kept but produced no records
pub fn unmatched_asset_ids(matched: &[MatchedRow]) -> Vec<String> {
    matched
        .iter()
        .filter(|m| m.record_count == 0)
        .map(|m| m.row.asset_id.clone())
        .collect()
}

fn chunk_payload(chunk: &[NormalizedRecord]) -> Payload {
    let Some(first) = chunk.first() else {
        return Payload::default();
    };
    let columns: Vec<&str> = first.keys().collect();

    let tuples: Vec<String> = chunk
        .iter()
        .map(|record| {
            let values: Vec<String> = columns
                .iter()
                .map(|c| {
                    record
                        .get(c)
                        .map(SqlValue::to_literal)
                        .unwrap_or_else(|| NULL_MARKER.to_string())
                })
                .collect();
            format!("({})", values.join(", "))
        })
        .collect();

    Payload {
        params: vec![
            (COLUMN_PARAM, SqlValue::Text(columns.join(","))),
            (VALUE_PARAM, SqlValue::Text(tuples.join(","))),
        ],
        records: chunk.len(),
        asset_ids: 0,
    }
}

/// Render `EXEC <procedure> \n@Name='value',...`
pub fn render(procedure: &str, params: &[(&str, SqlValue)]) -> String {
    let assignments: Vec<String> = params
        .iter()
        .map(|(name, value)| format!("@{}={}", name, value.to_literal()))
        .collect();
    format!("EXEC {} \n{}", procedure, assignments.join(",")).replace("\\r\\n", "\r\n")
}
