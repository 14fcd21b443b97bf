//! SQL Server store over tiberius
//!
//! One TCP connection per run. Connection setup is retried with bounded
//! exponential backoff; login failures are not retried.

use super::StoreAdapter;
use crate::config::DatabaseConfig;
use crate::error::{Result, SyncError};
use crate::models::StoreRow;
use async_trait::async_trait;
use ccp_common::retry::retry_with_backoff;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::{Number, Value};
use tiberius::{AuthMethod, Client, ColumnData, Config, FromSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};

type MssqlClient = Client<Compat<TcpStream>>;

/// SQL Server error number for a failed login
const LOGIN_FAILED: u32 = 18456;

pub struct MssqlStore {
    client: MssqlClient,
    in_transaction: bool,
}

impl MssqlStore {
    /// Connect with the configured retry policy
    pub async fn connect(db: &DatabaseConfig) -> Result<Self> {
        let config = tiberius_config(db);
        let policy = db.retry_policy();

        info!(host = %db.host, port = db.port, "Connecting to SQL Server...");

        let client = retry_with_backoff("sql server connect", policy, is_retryable, || {
            connect_once(config.clone())
        })
        .await
        .map_err(|give_up| {
            SyncError::Store(format!(
                "Could not connect to SQL Server after {} attempt(s): {}",
                give_up.attempts, give_up.last_error
            ))
        })?;

        info!("SQL Server connection established");

        Ok(Self {
            client,
            in_transaction: false,
        })
    }
}

/// One T-SQL batch on an open connection
#[async_trait]
trait BatchRunner: Send {
    async fn run_batch(&mut self, sql: &str) -> Result<()>;
}

#[async_trait]
impl BatchRunner for MssqlClient {
    async fn run_batch(&mut self, sql: &str) -> Result<()> {
        self.simple_query(sql).await?.into_results().await?;
        Ok(())
    }
}

/// Run `command` inside the open transaction, beginning one if needed
///
/// A failed command rolls the transaction back before the error is returned,
/// so the connection never holds a half-applied transaction.
async fn execute_in_transaction<B: BatchRunner>(
    runner: &mut B,
    open: &mut bool,
    command: &str,
) -> Result<()> {
    if !*open {
        runner.run_batch("BEGIN TRANSACTION").await?;
        *open = true;
    }
    if let Err(e) = runner.run_batch(command).await {
        *open = false;
        if let Err(rollback) = runner.run_batch("ROLLBACK TRANSACTION").await {
            warn!(error = %rollback, "Rollback after failed command also failed");
        }
        return Err(e);
    }
    Ok(())
}

fn tiberius_config(db: &DatabaseConfig) -> Config {
    let mut config = Config::new();
    config.host(&db.host);
    config.port(db.port);
    if let Some(database) = &db.database {
        config.database(database);
    }
    config.authentication(AuthMethod::sql_server(
        db.user.as_deref().unwrap_or_default(),
        db.password.as_deref().unwrap_or_default(),
    ));
    if db.trust_cert {
        config.trust_cert();
    }
    config
}

async fn connect_once(config: Config) -> std::result::Result<MssqlClient, tiberius::error::Error> {
    let tcp = TcpStream::connect(config.get_addr()).await?;
    tcp.set_nodelay(true)?;

    match Client::connect(config.clone(), tcp.compat_write()).await {
        Ok(client) => Ok(client),
        // Azure SQL may redirect the login to another node
        Err(tiberius::error::Error::Routing { host, port }) => {
            debug!(host = %host, port, "SQL Server routing redirect");
            let mut config = config;
            config.host(&host);
            config.port(port);
            let tcp = TcpStream::connect(config.get_addr()).await?;
            tcp.set_nodelay(true)?;
            Client::connect(config, tcp.compat_write()).await
        }
        Err(e) => Err(e),
    }
}

fn is_retryable(err: &tiberius::error::Error) -> bool {
    match err {
        tiberius::error::Error::Server(token) => token.code() != LOGIN_FAILED,
        tiberius::error::Error::Conversion(_)
        | tiberius::error::Error::Utf8
        | tiberius::error::Error::Utf16 => false,
        _ => true,
    }
}

/// Convert one cell to a nested value
fn cell_value(data: &ColumnData<'static>) -> Value {
    match data {
        ColumnData::U8(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::I16(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::I32(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::I64(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::F32(v) => v
            .and_then(|f| Number::from_f64(f as f64))
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ColumnData::F64(v) => v
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ColumnData::Bit(v) => v.map(Value::Bool).unwrap_or(Value::Null),
        ColumnData::String(v) => v
            .as_ref()
            .map(|s| Value::String(s.to_string()))
            .unwrap_or(Value::Null),
        ColumnData::Guid(v) => v.map(|g| Value::String(g.to_string())).unwrap_or(Value::Null),
        ColumnData::Numeric(v) => v
            .map(|n| Value::String(n.to_string()))
            .unwrap_or(Value::Null),
        _ => temporal_value(data),
    }
}

/// Date and time columns, rendered in the canonical timestamp format
fn temporal_value(data: &ColumnData<'static>) -> Value {
    if let Ok(Some(dt)) = NaiveDateTime::from_sql(data) {
        return Value::String(dt.format("%Y-%m-%d %H:%M:%S").to_string());
    }
    if let Ok(Some(d)) = NaiveDate::from_sql(data) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(t)) = NaiveTime::from_sql(data) {
        return Value::String(t.format("%H:%M:%S").to_string());
    }
    if let Ok(Some(dt)) = DateTime::<FixedOffset>::from_sql(data) {
        return Value::String(dt.naive_local().format("%Y-%m-%d %H:%M:%S").to_string());
    }
    Value::Null
}

#[async_trait]
impl StoreAdapter for MssqlStore {
    async fn query(&mut self, sql: &str) -> Result<Vec<StoreRow>> {
        debug!(sql = %sql, "Running query");
        let rows = self.client.simple_query(sql).await?.into_first_result().await?;

        Ok(rows
            .iter()
            .map(|row| {
                row.cells()
                    .map(|(column, data)| (column.name().to_string(), cell_value(data)))
                    .collect::<StoreRow>()
            })
            .collect())
    }

    async fn execute(&mut self, command: &str) -> Result<()> {
        execute_in_transaction(&mut self.client, &mut self.in_transaction, command).await
    }

    async fn commit(&mut self) -> Result<()> {
        if self.in_transaction {
            self.client.run_batch("COMMIT TRANSACTION").await?;
            self.in_transaction = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[test]
    fn test_cell_value_scalars() {
        assert_eq!(cell_value(&ColumnData::I32(Some(7))), Value::from(7));
        assert_eq!(cell_value(&ColumnData::I64(None)), Value::Null);
        assert_eq!(cell_value(&ColumnData::Bit(Some(true))), Value::Bool(true));
        assert_eq!(
            cell_value(&ColumnData::String(Some(Cow::Borrowed("abc")))),
            Value::String("abc".into())
        );
        assert_eq!(cell_value(&ColumnData::F64(Some(36.5))), Value::from(36.5));
    }

    #[test]
    fn test_login_failure_not_retryable() {
        let io = tiberius::error::Error::Io {
            kind: std::io::ErrorKind::ConnectionRefused,
            message: "refused".into(),
        };
        assert!(is_retryable(&io));
        assert!(!is_retryable(&tiberius::error::Error::Utf8));
    }

    #[derive(Default)]
    struct ScriptedRunner {
        batches: Vec<String>,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl BatchRunner for ScriptedRunner {
        async fn run_batch(&mut self, sql: &str) -> Result<()> {
            self.batches.push(sql.to_string());
            if self.fail_on == Some(sql) {
                return Err(SyncError::Store(format!("batch failed: {}", sql)));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_transaction_begins_once() {
        let mut runner = ScriptedRunner::default();
        let mut open = false;

        execute_in_transaction(&mut runner, &mut open, "EXEC a").await.unwrap();
        execute_in_transaction(&mut runner, &mut open, "EXEC b").await.unwrap();

        assert!(open);
        assert_eq!(runner.batches, vec!["BEGIN TRANSACTION", "EXEC a", "EXEC b"]);
    }

    #[tokio::test]
    async fn test_failed_command_rolls_back() {
        let mut runner = ScriptedRunner {
            fail_on: Some("EXEC bad"),
            ..Default::default()
        };
        let mut open = false;

        let err = execute_in_transaction(&mut runner, &mut open, "EXEC bad")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "StoreError");
        assert!(!open);
        assert_eq!(
            runner.batches,
            vec!["BEGIN TRANSACTION", "EXEC bad", "ROLLBACK TRANSACTION"]
        );
    }

    #[derive(Default)]
    struct BrokenConnection {
        batches: Vec<String>,
    }

    #[async_trait]
    impl BatchRunner for BrokenConnection {
        async fn run_batch(&mut self, sql: &str) -> Result<()> {
            self.batches.push(sql.to_string());
            Err(SyncError::Store(format!("batch failed: {}", sql)))
        }
    }

    #[tokio::test]
    async fn test_rollback_failure_keeps_command_error() {
        let mut runner = BrokenConnection::default();
        let mut open = true;

        let err = execute_in_transaction(&mut runner, &mut open, "EXEC bad")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("EXEC bad"));
        assert!(!open);
        assert_eq!(runner.batches, vec!["EXEC bad", "ROLLBACK TRANSACTION"]);
    }

    #[test]
    fn test_tiberius_config_address() {
        let db = crate::config::DatabaseConfig {
            backend: crate::config::StoreBackend::Mssql,
            host: "db.internal".into(),
            port: 14330,
            database: Some("Assets".into()),
            user: Some("sync".into()),
            password: Some("secret".into()),
            url: None,
            trust_cert: true,
            connect_attempts: 3,
            initial_backoff_ms: 10,
            max_backoff_ms: 100,
        };
        assert_eq!(tiberius_config(&db).get_addr(), "db.internal:14330");
    }
}
