//! ccp-sync - Main entry point
//!
//! One sync pass per invocation: load configuration, connect to the store,
//! run the pipeline, exit.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ccp_common::config::ConfigFileResolver;
use ccp_common::logging::{default_directive, init_tracing};
use ccp_sync::store::{self, DryRunStore, StoreAdapter};
use ccp_sync::{run_pipeline, Config, RunContext, RunMode, SoapClient};
use chrono::Local;
use clap::Parser;
use tracing::{error, info};

/// Command-line arguments for ccp-sync
#[derive(Parser, Debug)]
#[command(name = "ccp-sync")]
#[command(about = "Synchronize child cases from the remote SOAP service into the asset database")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Process every row, ignoring flag age, without the asset-id trailer
    #[arg(long)]
    historical: bool,

    /// Log write commands instead of executing them
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = ConfigFileResolver::new("ccp-sync")
        .resolve(args.config.as_deref())
        .context("Failed to locate configuration")?;
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    let _error_log_guard = init_tracing(
        &default_directive(&config.logging.level, &["ccp_sync", "ccp_common"]),
        config.logging.error_log_dir.as_deref(),
    )?;

    if let Err(e) = run(&args, &config, &config_path).await {
        error!(error = %format!("{:#}", e), "ccp-sync failed");
        return Err(e);
    }
    Ok(())
}

async fn run(args: &Args, config: &Config, config_path: &Path) -> Result<()> {
    info!("Starting ccp-sync at {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
    info!("Configuration: {}", config_path.display());

    let mode = RunMode::from_flag(config.sync.historical || args.historical);
    let ctx = RunContext::new(mode, config.remote.clone(), config.sync.clone())
        .context("Invalid run configuration")?;
    if mode.is_historical() {
        info!("Historical run: all rows, no flag-age filtering");
    }

    let mut store: Box<dyn StoreAdapter> = store::connect(&config.database)
        .await
        .context("Failed to connect to the database")?;
    if args.dry_run {
        info!("Dry run: write commands will be logged, not executed");
        store = Box::new(DryRunStore::new(store));
    }

    let remote = SoapClient::new(ctx.remote.url.clone(), ctx.remote.timeout())
        .context("Failed to create SOAP client")?;

    let report = run_pipeline(&ctx, store.as_mut(), &remote)
        .await
        .context("Sync run failed")?;

    info!(
        rows = report.rows_selected,
        calls = report.remote_calls,
        failed_calls = report.failed_calls,
        records = report.records,
        commands = report.commands_written,
        "Sync run complete"
    );
    Ok(())
}
