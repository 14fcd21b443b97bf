//! Configuration file resolution and TOML loading
//!
//! Config file resolution priority order:
//! 1. Command-line argument (highest priority)
//! 2. `CCP_CONFIG` environment variable
//! 3. User config directory (`~/.config/ccp/<module>.toml`)
//! 4. System config directory (`/etc/ccp/<module>.toml`, Linux only)

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "CCP_CONFIG";

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for the daily error log; errors go to stdout only when unset
    #[serde(default)]
    pub error_log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            error_log_dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolves which TOML file a module should load
pub struct ConfigFileResolver {
    module_name: String,
}

impl ConfigFileResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
        }
    }

    /// Resolve the config file path
    ///
    /// An explicit path (CLI or env) is returned even if it does not exist, so the
    /// subsequent read reports the real I/O error. Directory candidates are only
    /// returned when the file is present.
    pub fn resolve(&self, cli_arg: Option<&Path>) -> Result<PathBuf> {
        // Priority 1: Command-line argument
        if let Some(path) = cli_arg {
            return Ok(path.to_path_buf());
        }

        // Priority 2: Environment variable
        if let Some(path) = env_override(CONFIG_ENV_VAR) {
            return Ok(PathBuf::from(path));
        }

        // Priority 3/4: well-known locations
        let file_name = format!("{}.toml", self.module_name);
        let mut candidates = Vec::new();
        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join("ccp").join(&file_name));
        }
        if cfg!(target_os = "linux") {
            candidates.push(PathBuf::from("/etc/ccp").join(&file_name));
        }

        candidates
            .iter()
            .find(|path| path.exists())
            .cloned()
            .ok_or_else(|| {
                Error::Config(format!(
                    "No config file found for {}. Pass --config, set {}, or create one of: {}",
                    self.module_name,
                    CONFIG_ENV_VAR,
                    candidates
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }
}

/// Read and parse a TOML file into `T`
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    let parsed = toml::from_str(&content)?;
    tracing::info!("Loaded TOML configuration from {}", path.display());
    Ok(parsed)
}

/// Read an environment variable, ignoring unset and whitespace-only values
pub fn env_override(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a boolean flag as accepted in environment variables
pub fn parse_bool_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!("Invalid boolean value: {}", other))),
    }
}
