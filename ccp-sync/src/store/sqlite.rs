//! SQLite store over an sqlx pool
//!
//! Single-connection pool so the open write transaction and later reads see
//! the same connection.

use super::StoreAdapter;
use crate::error::{Result, SyncError};
use crate::models::StoreRow;
use async_trait::async_trait;
use ccp_common::retry::{retry_with_backoff, RetryPolicy};
use serde_json::{Number, Value};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, Sqlite, Transaction, TypeInfo, ValueRef};
use tracing::{debug, info};

pub struct SqliteStore {
    pool: SqlitePool,
    tx: Option<Transaction<'static, Sqlite>>,
}

impl SqliteStore {
    /// Open a pool for `url` with the given retry policy
    pub async fn connect(url: &str, policy: RetryPolicy) -> Result<Self> {
        info!(url = %url, "Opening SQLite store");

        let pool = retry_with_backoff(
            "sqlite connect",
            policy,
            |e: &sqlx::Error| !matches!(e, sqlx::Error::Configuration(_)),
            || SqlitePoolOptions::new().max_connections(1).connect(url),
        )
        .await
        .map_err(|give_up| {
            SyncError::Store(format!(
                "Could not open SQLite store after {} attempt(s): {}",
                give_up.attempts, give_up.last_error
            ))
        })?;

        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool, tx: None }
    }
}

fn column_value(row: &SqliteRow, index: usize) -> Result<Value> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_ascii_uppercase();

    let value = match type_name.as_str() {
        "INTEGER" | "INT" | "BIGINT" | "INT8" => Value::from(row.try_get::<i64, _>(index)?),
        "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => Number::from_f64(row.try_get::<f64, _>(index)?)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        "BOOLEAN" => Value::Bool(row.try_get::<bool, _>(index)?),
        _ => row
            .try_get::<String, _>(index)
            .map(Value::String)
            .unwrap_or(Value::Null),
    };
    Ok(value)
}

fn to_store_row(row: &SqliteRow) -> Result<StoreRow> {
    let mut out = StoreRow::new();
    for (index, column) in row.columns().iter().enumerate() {
        out.insert(column.name().to_string(), column_value(row, index)?);
    }
    Ok(out)
}

#[async_trait]
impl StoreAdapter for SqliteStore {
    async fn query(&mut self, sql: &str) -> Result<Vec<StoreRow>> {
        debug!(sql = %sql, "Running query");
        let rows = match self.tx.as_mut() {
            Some(tx) => sqlx::query(sql).fetch_all(&mut **tx).await?,
            None => sqlx::query(sql).fetch_all(&self.pool).await?,
        };
        rows.iter().map(to_store_row).collect()
    }

    async fn execute(&mut self, command: &str) -> Result<()> {
        if self.tx.is_none() {
            self.tx = Some(self.pool.begin().await?);
        }
        if let Some(tx) = self.tx.as_mut() {
            let conn: &mut sqlx::SqliteConnection = &mut *tx;
            sqlx::Executor::execute(conn, sqlx::raw_sql(command)).await?;
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteStore::from_pool(pool)
    }

    #[tokio::test]
    async fn test_query_converts_column_types() {
        let mut store = memory_store().await;
        store
            .execute("CREATE TABLE t (id INTEGER, name TEXT, hours REAL, note TEXT)")
            .await
            .unwrap();
        store
            .execute("INSERT INTO t VALUES (7, 'pump', 12.5, NULL)")
            .await
            .unwrap();
        store.commit().await.unwrap();

        let rows = store.query("SELECT id, name, hours, note FROM t").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], Value::from(7));
        assert_eq!(rows[0]["name"], Value::from("pump"));
        assert_eq!(rows[0]["hours"], Value::from(12.5));
        assert_eq!(rows[0]["note"], Value::Null);
        let keys: Vec<_> = rows[0].keys().cloned().collect();
        assert_eq!(keys, vec!["id", "name", "hours", "note"]);
    }

    #[tokio::test]
    async fn test_execute_without_commit_is_rolled_back() {
        let mut store = memory_store().await;
        store.execute("CREATE TABLE t (id INTEGER)").await.unwrap();
        store.commit().await.unwrap();

        store.execute("INSERT INTO t VALUES (1)").await.unwrap();
        store.tx.take();

        let rows = store.query("SELECT id FROM t").await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_bad_command_is_store_error() {
        let mut store = memory_store().await;
        let err = store.execute("NOT SQL").await.unwrap_err();
        assert_eq!(err.kind(), "StoreError");
    }
}
