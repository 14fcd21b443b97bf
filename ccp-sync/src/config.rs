//! Configuration for ccp-sync
//!
//! Loaded once at startup from TOML, then environment overrides are applied and
//! the result is validated before any I/O happens.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (`--historical`, `--dry-run`)
//! 2. Environment variables (`CCP_REMOTE_URL`, `CCP_DB_PASSWORD`, `CCP_HISTORICAL`, `CCP_LOG_LEVEL`)
//! 3. TOML configuration file
//! 4. Built-in defaults (serde defaults below)

use crate::error::{Result, SyncError};
use ccp_common::config::{env_override, load_toml, parse_bool_flag, LoggingConfig};
use ccp_common::retry::RetryPolicy;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Complete configuration file
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub remote: RemoteConfig,
    pub database: DatabaseConfig,
    pub sync: SyncSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote SOAP service settings
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Endpoint URL requests are posted to
    pub url: String,

    /// Operation name, substituted for `{operation}` in templates
    pub operation: String,

    /// Full request document; `{body}` is replaced by the rendered `request_body`
    #[serde(default = "default_request_template")]
    pub request_template: String,

    /// Operation element; `{operation}` and `{case_id}` are substituted
    #[serde(default = "default_request_body")]
    pub request_body: String,

    #[serde(default = "default_envelope_key")]
    pub envelope_key: String,

    #[serde(default = "default_body_key")]
    pub body_key: String,

    /// Response wrapper element; `{operation}` is substituted
    #[serde(default = "default_response_wrapper")]
    pub response_wrapper: String,

    #[serde(default = "default_return_key")]
    pub return_key: String,

    #[serde(default = "default_fault_key")]
    pub fault_key: String,

    #[serde(default = "default_fault_string_key")]
    pub fault_string_key: String,

    /// Keys applied in order below the return value (may be empty)
    #[serde(default)]
    pub navigation_keys: Vec<String>,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Store backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Mssql,
    Sqlite,
}

/// Database connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub database: Option<String>,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Connection URL for the sqlite backend
    #[serde(default)]
    pub url: Option<String>,

    /// Accept the server certificate without validation
    #[serde(default = "default_true")]
    pub trust_cert: bool,

    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

/// Selection, inclusion and write settings
#[derive(Debug, Clone, Deserialize)]
pub struct SyncSettings {
    /// Stored procedure receiving the consolidated update
    pub procedure: String,

    /// Flag table name, used in log output
    #[serde(default)]
    pub table: String,

    /// Maximum records per command
    #[serde(default = "default_insert_limit")]
    pub insert_limit: usize,

    /// Rows with no child data are skipped until flagged this long (normal mode)
    #[serde(default = "default_flag_hour_limit")]
    pub flag_hour_limit: f64,

    #[serde(default)]
    pub historical: bool,

    /// Query returning currently flagged rows
    pub flagged_query: String,

    /// Query returning every row for a historical run
    #[serde(default)]
    pub historical_query: String,

    #[serde(default = "default_case_id_column")]
    pub case_id_column: String,

    #[serde(default = "default_asset_id_column")]
    pub asset_id_column: String,

    #[serde(default = "default_flag_age_column")]
    pub flag_age_column: String,
}

fn default_request_template() -> String {
    concat!(
        r#"<?xml version="1.0" encoding="UTF-8"?>"#,
        r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/" xmlns:ns="urn:{operation}">"#,
        r#"<SOAP-ENV:Body>{body}</SOAP-ENV:Body></SOAP-ENV:Envelope>"#
    )
    .to_string()
}

fn default_request_body() -> String {
    "<ns:get{operation}><case_id>{case_id}</case_id></ns:get{operation}>".to_string()
}

fn default_envelope_key() -> String {
    "SOAP-ENV:Envelope".to_string()
}

fn default_body_key() -> String {
    "SOAP-ENV:Body".to_string()
}

fn default_response_wrapper() -> String {
    "ns1:get{operation}Response".to_string()
}

fn default_return_key() -> String {
    "return".to_string()
}

fn default_fault_key() -> String {
    "SOAP-ENV:Fault".to_string()
}

fn default_fault_string_key() -> String {
    "faultstring".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_backend() -> StoreBackend {
    StoreBackend::Mssql
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1433
}

fn default_true() -> bool {
    true
}

fn default_connect_attempts() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_insert_limit() -> usize {
    100
}

fn default_flag_hour_limit() -> f64 {
    24.0
}

fn default_case_id_column() -> String {
    "Case_ID".to_string()
}

fn default_asset_id_column() -> String {
    "AssetID".to_string()
}

fn default_flag_age_column() -> String {
    "flag_last_on_hrs".to_string()
}

fn config_error(msg: impl Into<String>) -> SyncError {
    SyncError::Configuration(msg.into())
}

impl Config {
    /// Load, apply environment overrides, and validate
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: Config = load_toml(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from TOML text without touching the environment
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ccp_common::Error::from)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(url) = env_override("CCP_REMOTE_URL") {
            tracing::info!("Remote URL overridden by CCP_REMOTE_URL");
            self.remote.url = url;
        }
        if let Some(password) = env_override("CCP_DB_PASSWORD") {
            self.database.password = Some(password);
        }
        if let Some(flag) = env_override("CCP_HISTORICAL") {
            self.sync.historical = parse_bool_flag(&flag)?;
        }
        if let Some(level) = env_override("CCP_LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.remote.validate()?;
        self.database.validate()?;
        self.sync.validate()
    }
}

impl RemoteConfig {
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(config_error("remote.url must not be empty"));
        }
        if self.operation.trim().is_empty() {
            return Err(config_error("remote.operation must not be empty"));
        }
        if !self.request_template.contains("{body}") {
            return Err(config_error("remote.request_template must contain {body}"));
        }
        if !self.request_body.contains("{case_id}") {
            return Err(config_error("remote.request_body must contain {case_id}"));
        }
        for (name, key) in [
            ("envelope_key", &self.envelope_key),
            ("body_key", &self.body_key),
            ("response_wrapper", &self.response_wrapper),
            ("return_key", &self.return_key),
        ] {
            if key.trim().is_empty() {
                return Err(config_error(format!("remote.{} must not be empty", name)));
            }
        }
        if self.timeout_secs == 0 {
            return Err(config_error("remote.timeout_secs must be positive"));
        }
        Ok(())
    }

    /// Render the request document for one case id
    pub fn request_for(&self, case_id: &str) -> String {
        let body = self
            .request_body
            .replace("{operation}", &self.operation)
            .replace("{case_id}", &escape_xml(case_id));
        self.request_template
            .replace("{operation}", &self.operation)
            .replace("{body}", &body)
    }

    /// Key of the operation response element
    pub fn response_wrapper_key(&self) -> String {
        self.response_wrapper.replace("{operation}", &self.operation)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<()> {
        match self.backend {
            StoreBackend::Mssql => {
                if self.database.as_deref().map_or(true, |d| d.trim().is_empty()) {
                    return Err(config_error("database.database is required for mssql"));
                }
                if self.user.as_deref().map_or(true, |u| u.trim().is_empty()) {
                    return Err(config_error("database.user is required for mssql"));
                }
            }
            StoreBackend::Sqlite => {
                if self.url.as_deref().map_or(true, |u| u.trim().is_empty()) {
                    return Err(config_error("database.url is required for sqlite"));
                }
            }
        }
        if self.connect_attempts == 0 {
            return Err(config_error("database.connect_attempts must be positive"));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.connect_attempts,
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }
}

impl SyncSettings {
    pub fn validate(&self) -> Result<()> {
        if self.procedure.trim().is_empty() {
            return Err(config_error("sync.procedure must not be empty"));
        }
        if self.insert_limit == 0 {
            return Err(config_error("sync.insert_limit must be a positive integer"));
        }
        if !self.flag_hour_limit.is_finite() || self.flag_hour_limit < 0.0 {
            return Err(config_error(format!(
                "sync.flag_hour_limit must be a non-negative number, got {}",
                self.flag_hour_limit
            )));
        }
        if self.flagged_query.trim().is_empty() {
            return Err(config_error("sync.flagged_query must not be empty"));
        }
        if self.historical && self.historical_query.trim().is_empty() {
            return Err(config_error(
                "sync.historical_query is required when historical = true",
            ));
        }
        for (name, column) in [
            ("case_id_column", &self.case_id_column),
            ("asset_id_column", &self.asset_id_column),
            ("flag_age_column", &self.flag_age_column),
        ] {
            if column.trim().is_empty() {
                return Err(config_error(format!("sync.{} must not be empty", name)));
            }
        }
        Ok(())
    }
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[remote]
url = "https://vendor.example.com/soap"
operation = "FC"

[database]
database = "Assets"
user = "sync"

[sync]
procedure = "dbo.usp_ChildCaseUpsert"
flagged_query = "SELECT * FROM dbo.ChildCaseFlags WHERE flag = 1"
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = Config::from_toml_str(MINIMAL).unwrap();

        assert_eq!(config.remote.envelope_key, "SOAP-ENV:Envelope");
        assert_eq!(config.remote.response_wrapper_key(), "ns1:getFCResponse");
        assert!(config.remote.navigation_keys.is_empty());
        assert_eq!(config.database.backend, StoreBackend::Mssql);
        assert_eq!(config.database.port, 1433);
        assert_eq!(config.sync.insert_limit, 100);
        assert_eq!(config.sync.flag_hour_limit, 24.0);
        assert_eq!(config.sync.case_id_column, "Case_ID");
        assert!(!config.sync.historical);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_request_for_substitutes_case_id() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        let request = config.remote.request_for("12345");

        assert!(request.contains("<ns:getFC><case_id>12345</case_id></ns:getFC>"));
        assert!(request.contains("xmlns:ns=\"urn:FC\""));
        assert!(request.starts_with("<?xml"));
    }

    #[test]
    fn test_request_for_escapes_markup() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        let request = config.remote.request_for("1<2");
        assert!(request.contains("<case_id>1&lt;2</case_id>"));
    }

    #[test]
    fn test_zero_insert_limit_rejected() {
        let toml = MINIMAL.replace(
            "procedure = \"dbo.usp_ChildCaseUpsert\"",
            "procedure = \"dbo.usp_ChildCaseUpsert\"\ninsert_limit = 0",
        );
        let err = Config::from_toml_str(&toml).unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
        assert!(err.to_string().contains("insert_limit"));
    }

    #[test]
    fn test_negative_flag_hour_limit_rejected() {
        let toml = MINIMAL.replace(
            "procedure = \"dbo.usp_ChildCaseUpsert\"",
            "procedure = \"dbo.usp_ChildCaseUpsert\"\nflag_hour_limit = -1.0",
        );
        assert!(Config::from_toml_str(&toml).is_err());
    }

    #[test]
    fn test_historical_requires_query() {
        let toml = MINIMAL.replace(
            "procedure = \"dbo.usp_ChildCaseUpsert\"",
            "procedure = \"dbo.usp_ChildCaseUpsert\"\nhistorical = true",
        );
        let err = Config::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("historical_query"));
    }

    #[test]
    fn test_sqlite_backend_requires_url() {
        let toml = MINIMAL.replace("[database]", "[database]\nbackend = \"sqlite\"");
        let err = Config::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("database.url"));
    }

    #[test]
    fn test_missing_procedure_is_parse_error() {
        let toml = MINIMAL.replace("procedure = \"dbo.usp_ChildCaseUpsert\"", "");
        assert!(Config::from_toml_str(&toml).is_err());
    }

    #[test]
    fn test_template_without_body_rejected() {
        let toml = MINIMAL.replace(
            "operation = \"FC\"",
            "operation = \"FC\"\nrequest_template = \"<Envelope/>\"",
        );
        let err = Config::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("{body}"));
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        let policy = config.database.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_backoff, Duration::from_millis(500));
        assert_eq!(policy.max_backoff, Duration::from_secs(30));
    }
}
