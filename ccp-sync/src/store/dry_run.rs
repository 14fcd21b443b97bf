//! Dry-run store wrapper
//!
//! Reads go to the wrapped backend; writes are logged and counted, never run.

use super::StoreAdapter;
use crate::error::Result;
use crate::models::StoreRow;
use async_trait::async_trait;
use tracing::info;

pub struct DryRunStore {
    inner: Box<dyn StoreAdapter>,
    skipped: Vec<String>,
}

impl DryRunStore {
    pub fn new(inner: Box<dyn StoreAdapter>) -> Self {
        Self {
            inner,
            skipped: Vec::new(),
        }
    }

    /// Commands that would have been executed, in order
    pub fn skipped_commands(&self) -> &[String] {
        &self.skipped
    }
}

#[async_trait]
impl StoreAdapter for DryRunStore {
    async fn query(&mut self, sql: &str) -> Result<Vec<StoreRow>> {
        self.inner.query(sql).await
    }

    async fn execute(&mut self, command: &str) -> Result<()> {
        info!(command = %command, "Dry run: command not executed");
        self.skipped.push(command.to_string());
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        Ok(())
    }
}
