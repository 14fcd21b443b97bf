//! Run context
//!
//! Everything a run needs to know, fixed before the first stage starts and
//! passed by reference to every stage.

use crate::config::{RemoteConfig, SyncSettings};
use crate::error::Result;

/// Which selection/inclusion variant a run uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Flagged rows only; flag-age threshold and asset-id trailer apply
    Normal,
    /// Every row; no flag-age filtering, no trailer
    Historical,
}

impl RunMode {
    pub fn from_flag(historical: bool) -> Self {
        if historical {
            RunMode::Historical
        } else {
            RunMode::Normal
        }
    }

    pub fn is_historical(self) -> bool {
        self == RunMode::Historical
    }
}

/// Immutable parameters of one run
#[derive(Debug, Clone)]
pub struct RunContext {
    pub mode: RunMode,
    pub remote: RemoteConfig,
    pub sync: SyncSettings,
}

impl RunContext {
    /// Build a validated context
    pub fn new(mode: RunMode, remote: RemoteConfig, sync: SyncSettings) -> Result<Self> {
        remote.validate()?;
        sync.validate()?;
        if mode.is_historical() && sync.historical_query.trim().is_empty() {
            return Err(crate::error::SyncError::Configuration(
                "sync.historical_query is required for a historical run".to_string(),
            ));
        }
        Ok(Self { mode, remote, sync })
    }

    /// Query for this run's mode
    pub fn selection_query(&self) -> &str {
        match self.mode {
            RunMode::Normal => &self.sync.flagged_query,
            RunMode::Historical => &self.sync.historical_query,
        }
    }
}
