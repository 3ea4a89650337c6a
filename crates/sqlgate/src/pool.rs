//! Connection pool seam.
//!
//! The executor only talks to [`SessionPool`] and [`Session`]; the SQLite
//! implementation below is the production one.

use std::fmt::Write as _;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use serde_json::{Number, Value};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Column, Executor, Row, Sqlite, Statement, TypeInfo, ValueRef};
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::error::{GatewayError, Result};
use crate::result::{ExecutionResult, FieldDescriptor, Row as ResultRow};

/// A bounded pool of database sessions.
pub trait SessionPool: Send + Sync + 'static {
    /// The session type handed out.
    type Session: Session;

    /// Waits for a free session, failing with [`GatewayError::PoolExhausted`]
    /// once the pool's wait bound passes.
    fn acquire(&self) -> impl Future<Output = Result<Self::Session>> + Send;
}

/// One exclusively owned database session.
///
/// `release` and `discard` consume the session, so each acquisition ends
/// exactly once.
pub trait Session: Send + 'static {
    /// Opens a transaction.
    fn begin(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Runs the SQL and collects its result. When it holds several
    /// statements, the rows of each are collected in turn.
    fn fetch(&mut self, sql: &str) -> impl Future<Output = Result<ExecutionResult>> + Send;

    /// Rolls the open transaction back.
    fn rollback(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Returns the session to the pool for reuse.
    fn release(self);

    /// Closes the session without returning it to the pool.
    fn discard(self);
}

/// [`SessionPool`] over a `sqlx` SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteSessionPool {
    pool: SqlitePool,
    acquire_timeout: Duration,
}

impl SqliteSessionPool {
    /// Opens a pool from configuration. The database file must exist.
    pub async fn connect(config: &PoolConfig) -> Result<Self> {
        let options =
            SqliteConnectOptions::from_str(&config.database_url)?.read_only(config.read_only);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect_with(options)
            .await?;

        info!(
            database = %config.database_url,
            max_connections = config.max_connections,
            read_only = config.read_only,
            "Connected to database"
        );
        Ok(Self::from_pool(pool, config.acquire_timeout()))
    }

    /// Wraps an existing pool. `acquire_timeout` should match the pool's own
    /// setting; it is only used in error reports.
    #[must_use]
    pub const fn from_pool(pool: SqlitePool, acquire_timeout: Duration) -> Self {
        Self {
            pool,
            acquire_timeout,
        }
    }

    /// Returns the underlying pool.
    #[must_use]
    pub const fn inner(&self) -> &SqlitePool {
        &self.pool
    }
}

impl SessionPool for SqliteSessionPool {
    type Session = SqliteSession;

    async fn acquire(&self) -> Result<SqliteSession> {
        match self.pool.acquire().await {
            Ok(conn) => Ok(SqliteSession {
                conn: Some(conn),
                in_transaction: false,
            }),
            Err(sqlx::Error::PoolTimedOut) => {
                warn!(waited = ?self.acquire_timeout, "Connection pool exhausted");
                Err(GatewayError::PoolExhausted(self.acquire_timeout))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// A pooled SQLite connection.
///
/// Dropped while a transaction is open (for instance during a panic), the
/// connection is detached from the pool and closed instead of recycled.
#[derive(Debug)]
pub struct SqliteSession {
    conn: Option<PoolConnection<Sqlite>>,
    in_transaction: bool,
}

impl SqliteSession {
    fn connection(&mut self) -> Result<&mut SqliteConnection> {
        self.conn
            .as_deref_mut()
            .ok_or(GatewayError::Execution(sqlx::Error::PoolClosed))
    }
}

impl Session for SqliteSession {
    async fn begin(&mut self) -> Result<()> {
        sqlx::query("BEGIN").execute(self.connection()?).await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn fetch(&mut self, sql: &str) -> Result<ExecutionResult> {
        let conn = self.connection()?;
        // Only the first statement is prepared; its declared types label the
        // fields even when it returns no rows.
        let statement = (&mut *conn).prepare(sql).await?;
        let mut fields: Vec<FieldDescriptor> = statement
            .columns()
            .iter()
            .map(|column| FieldDescriptor::new(column.name(), column.type_info().name()))
            .collect();

        let rows = statement.query().fetch_all(&mut *conn).await?;
        let mut decoded = Vec::with_capacity(rows.len());
        for row in &rows {
            for column in row.columns() {
                if !fields.iter().any(|field| field.name == column.name()) {
                    fields.push(FieldDescriptor::new(column.name(), column.type_info().name()));
                }
            }
            decoded.push(decode_row(row)?);
        }
        debug!(rows = decoded.len(), columns = fields.len(), "Fetched rows");

        Ok(ExecutionResult::new(fields, decoded))
    }

    async fn rollback(&mut self) -> Result<()> {
        sqlx::query("ROLLBACK").execute(self.connection()?).await?;
        self.in_transaction = false;
        Ok(())
    }

    fn release(self) {
        // Drop returns a clean connection to the pool.
        drop(self);
    }

    fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            drop(conn.detach());
        }
    }
}

impl Drop for SqliteSession {
    fn drop(&mut self) {
        if self.in_transaction {
            if let Some(conn) = self.conn.take() {
                warn!("Session dropped inside a transaction, closing connection");
                drop(conn.detach());
            }
        }
    }
}

/// Decodes a row under its own column names.
fn decode_row(row: &SqliteRow) -> Result<ResultRow> {
    let columns = row.columns();
    let mut out = ResultRow::with_capacity(columns.len());
    for column in columns {
        out.insert(column.name().to_string(), decode_value(row, column.ordinal())?);
    }
    Ok(out)
}

/// Decodes one value by its storage class.
fn decode_value(row: &SqliteRow, index: usize) -> Result<Value> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let storage = raw.type_info().name().to_string();

    let value = match storage.as_str() {
        "INTEGER" => Value::from(row.try_get_unchecked::<i64, _>(index)?),
        "REAL" => Number::from_f64(row.try_get_unchecked::<f64, _>(index)?)
            .map_or(Value::Null, Value::Number),
        "BLOB" => Value::String(hex(&row.try_get_unchecked::<Vec<u8>, _>(index)?)),
        _ => Value::String(row.try_get_unchecked::<String, _>(index)?),
    };
    Ok(value)
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn create_test_pool() -> SqliteSessionPool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_millis(100))
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite pool");
        SqliteSessionPool::from_pool(pool, Duration::from_millis(100))
    }

    #[test]
    fn test_hex() {
        assert_eq!(hex(&[0xca, 0xfe, 0x01]), "cafe01");
        assert_eq!(hex(&[]), "");
    }

    #[tokio::test]
    async fn test_storage_classes() {
        let pool = create_test_pool().await;
        let mut session = pool.acquire().await.unwrap();
        session.begin().await.unwrap();

        let result = session
            .fetch("SELECT 1 AS i, 2.5 AS r, 'text' AS t, x'CAFE' AS b, NULL AS n")
            .await
            .unwrap();
        session.rollback().await.unwrap();
        session.release();

        assert_eq!(result.row_count, 1);
        assert_eq!(result.field_names(), vec!["i", "r", "t", "b", "n"]);
        let row = &result.rows[0];
        assert_eq!(row["i"], Value::from(1));
        assert_eq!(row["r"], Value::from(2.5));
        assert_eq!(row["t"], Value::from("text"));
        assert_eq!(row["b"], Value::from("cafe"));
        assert_eq!(row["n"], Value::Null);
    }

    #[tokio::test]
    async fn test_each_statement_keeps_its_columns() {
        let pool = create_test_pool().await;
        let mut session = pool.acquire().await.unwrap();
        session.begin().await.unwrap();

        let result = session
            .fetch("SELECT 1 AS id; SELECT 'carol' AS name, 41 AS age; SELECT 2 AS id")
            .await
            .unwrap();
        session.rollback().await.unwrap();
        session.release();

        assert_eq!(result.field_names(), vec!["id", "name", "age"]);
        assert_eq!(result.row_count, 3);
        assert_eq!(Value::Object(result.rows[0].clone()), serde_json::json!({"id": 1}));
        assert_eq!(
            Value::Object(result.rows[1].clone()),
            serde_json::json!({"name": "carol", "age": 41})
        );
        assert_eq!(Value::Object(result.rows[2].clone()), serde_json::json!({"id": 2}));
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let pool = create_test_pool().await;
        sqlx::query("CREATE TABLE t (id INTEGER)")
            .execute(pool.inner())
            .await
            .unwrap();

        let mut session = pool.acquire().await.unwrap();
        session.begin().await.unwrap();
        session.fetch("INSERT INTO t (id) VALUES (1)").await.unwrap();
        session.rollback().await.unwrap();
        session.release();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM t")
            .fetch_one(pool.inner())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_exhaustion() {
        let pool = create_test_pool().await;
        let held = pool.acquire().await.unwrap();

        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, GatewayError::PoolExhausted(_)));

        held.release();
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_dropped_transaction_is_not_recycled() {
        let pool = create_test_pool().await;

        let mut session = pool.acquire().await.unwrap();
        session.begin().await.unwrap();
        drop(session);

        // A recycled connection would still be inside the transaction and
        // refuse a nested BEGIN.
        let mut session = pool.acquire().await.unwrap();
        session.begin().await.unwrap();
        session.rollback().await.unwrap();
        session.release();
    }
}
