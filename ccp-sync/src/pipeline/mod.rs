//! Sync pipeline orchestrator
//!
//! **Stages:**
//! ```text
//! Selecting → Fetching → Extracting → Batching → Writing → Done
//!     │           │           │           │          │
//!     └───────────┴───────────┴───────────┴──────────┴──→ Failed
//! ```
//!
//! Each stage is a plain function taking the run context and returning its
//! output. The run ends in `Done` early when there are no rows (normal mode)
//! or nothing to write. Commands are written strictly in build order, each
//! followed by a commit.

pub mod batch;
pub mod extract;
pub mod fetch;
pub mod normalize;
pub mod select;

use crate::context::RunContext;
use crate::error::Result;
use crate::models::Command;
use crate::remote::RemoteAdapter;
use crate::store::StoreAdapter;
use chrono::Local;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Running the mode's read query
    Selecting,
    /// Remote calls in flight
    Fetching,
    /// Envelope descent, inclusion policy, normalization
    Extracting,
    /// Chunking and command rendering
    Batching,
    /// Sequential execute + commit
    Writing,
    /// Run finished (possibly without writing)
    Done,
    /// Run aborted with an error
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Selecting => "selecting",
            PipelineState::Fetching => "fetching",
            PipelineState::Extracting => "extracting",
            PipelineState::Batching => "batching",
            PipelineState::Writing => "writing",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a completed run
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub rows_selected: usize,
    pub remote_calls: usize,
    pub failed_calls: usize,
    pub records: usize,
    pub commands_written: usize,
    pub elapsed: Duration,
    pub final_state: PipelineState,
}

struct Run {
    state: PipelineState,
    started: Instant,
    report: RunReport,
}

impl Run {
    fn new() -> Self {
        Self {
            state: PipelineState::Selecting,
            started: Instant::now(),
            report: RunReport {
                rows_selected: 0,
                remote_calls: 0,
                failed_calls: 0,
                records: 0,
                commands_written: 0,
                elapsed: Duration::ZERO,
                final_state: PipelineState::Selecting,
            },
        }
    }

    fn enter(&mut self, next: PipelineState) {
        debug!(from = %self.state, to = %next, "Pipeline state transition");
        self.state = next;
    }

    async fn execute(
        &mut self,
        ctx: &RunContext,
        store: &mut dyn StoreAdapter,
        remote: &dyn RemoteAdapter,
    ) -> Result<()> {
        debug!(stage = %self.state, "Pipeline started");
        let rows = select::select_rows(ctx, store).await?;
        self.report.rows_selected = rows.len();
        if rows.is_empty() {
            return Ok(());
        }

        self.enter(PipelineState::Fetching);
        self.report.remote_calls = fetch::call_count(&rows);
        let results = fetch::fetch_all(ctx, remote, &rows).await;
        self.report.failed_calls = results.iter().filter(|r| r.is_failed()).count();

        self.enter(PipelineState::Extracting);
        let extraction = extract::extract(ctx, &rows, &results)?;
        self.report.records = extraction.records.len();

        self.enter(PipelineState::Batching);
        let commands = batch::build_commands(ctx, &extraction.records, &extraction.matched);
        if commands.is_empty() {
            info!("Nothing to write");
            return Ok(());
        }

        self.enter(PipelineState::Writing);
        self.report.commands_written = write_commands(store, &commands).await?;
        Ok(())
    }
}

/// Run one sync pass against the given store and remote service
pub async fn run_pipeline(
    ctx: &RunContext,
    store: &mut dyn StoreAdapter,
    remote: &dyn RemoteAdapter,
) -> Result<RunReport> {
    let mut run = Run::new();

    match run.execute(ctx, store, remote).await {
        Ok(()) => {
            run.enter(PipelineState::Done);
            run.report.final_state = PipelineState::Done;
            run.report.elapsed = run.started.elapsed();
            info!(
                "{} rows processed in {:.2} minutes",
                run.report.rows_selected,
                run.report.elapsed.as_secs_f64() / 60.0
            );
            info!("Completed at {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
            Ok(run.report)
        }
        Err(e) => {
            error!(stage = %run.state, kind = e.kind(), error = %e, "Sync run failed");
            run.enter(PipelineState::Failed);
            Err(e)
        }
    }
}

/// Execute and commit each command in order; returns the number written
pub async fn write_commands(store: &mut dyn StoreAdapter, commands: &[Command]) -> Result<usize> {
    let total = commands.len();
    for (index, command) in commands.iter().enumerate() {
        debug!(
            command = %command.text,
            index = index + 1,
            total,
            records = command.records,
            asset_ids = command.asset_ids,
            "Executing command"
        );
        store.execute(&command.text).await?;
        store.commit().await?;
    }
    info!(commands = total, "Commands written");
    Ok(total)
}
