//! Concurrent Fetcher
//!
//! One future per row with a case id, all joined with `join_all` so the
//! result at index `i` always belongs to `rows[i]`, whatever order the calls
//! finish in. A failed call is recorded in its slot and never cancels siblings.

use crate::context::RunContext;
use crate::models::{RemoteResult, Row};
use crate::remote::RemoteAdapter;
use futures::future::join_all;
use tracing::{debug, warn};

/// Fetch remote data for every row, preserving row order
pub async fn fetch_all(
    ctx: &RunContext,
    remote: &dyn RemoteAdapter,
    rows: &[Row],
) -> Vec<RemoteResult> {
    let total = rows.len();

    let futures = rows.iter().enumerate().map(|(index, row)| async move {
        let Some(case_id) = row.case_id.as_deref() else {
            debug!(asset_id = %row.asset_id, "No case id, skipping remote call");
            return RemoteResult::Skipped;
        };

        debug!("{}/{}", index + 1, total);
        match remote.post(ctx.remote.request_for(case_id)).await {
            Ok(document) => RemoteResult::Fetched(document),
            Err(e) => {
                warn!(asset_id = %row.asset_id, case_id = %case_id, error = %e, "Remote call failed");
                RemoteResult::Failed(e)
            }
        }
    });

    let results = join_all(futures).await;

    let failed = results.iter().filter(|r| r.is_failed()).count();
    if failed > 0 {
        warn!(failed, total, "Remote calls failed; rows treated as having no data");
    }

    results
}

/// Number of rows that produce a remote call
pub fn call_count(rows: &[Row]) -> usize {
    rows.iter().filter(|r| r.case_id.is_some()).count()
}
