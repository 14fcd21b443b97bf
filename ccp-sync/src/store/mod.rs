//! Relational store access
//!
//! [`StoreAdapter`] is the only surface the pipeline uses: one read query at
//! the start of a run, then sequential execute + commit per command.
//!
//! # Backends
//! - **mssql** - SQL Server via tiberius (production)
//! - **sqlite** - sqlx SQLite pool (local fixtures and tests)
//! - **dry run** - wraps another backend and logs writes instead of running them

pub mod dry_run;
pub mod mssql;
pub mod sqlite;

pub use dry_run::DryRunStore;
pub use mssql::MssqlStore;
pub use sqlite::SqliteStore;

use crate::config::{DatabaseConfig, StoreBackend};
use crate::error::{Result, SyncError};
use crate::models::StoreRow;
use async_trait::async_trait;

/// Read/write access to the relational store
#[async_trait]
pub trait StoreAdapter: Send {
    /// Run a read query and return every row
    async fn query(&mut self, sql: &str) -> Result<Vec<StoreRow>>;

    /// Run one write command inside the current unit of work
    async fn execute(&mut self, command: &str) -> Result<()>;

    /// Commit the current unit of work
    async fn commit(&mut self) -> Result<()>;
}

/// Open the configured backend
pub async fn connect(config: &DatabaseConfig) -> Result<Box<dyn StoreAdapter>> {
    match config.backend {
        StoreBackend::Mssql => Ok(Box::new(MssqlStore::connect(config).await?)),
        StoreBackend::Sqlite => {
            let url = config.url.as_deref().ok_or_else(|| {
                SyncError::Configuration("database.url is required for sqlite".to_string())
            })?;
            Ok(Box::new(
                SqliteStore::connect(url, config.retry_policy()).await?,
            ))
        }
    }
}
