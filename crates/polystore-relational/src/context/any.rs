//! sqlx `Any` context for SQLite, PostgreSQL and MySQL.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::pool::PoolConnection;
use sqlx::{Any, AnyConnection, AnyPool, Row, Transaction};
use tracing::{debug, info, warn};

use polystore_core::config::relational::{PoolSettings, ResilienceSettings};
use polystore_core::entity::ColumnType;
use polystore_core::error::{AppError, ErrorKind};
use polystore_core::result::AppResult;

use super::{SqlContext, SqlExecutor, SqlSession, with_timeout};
use crate::connection::{mask_password, retry};
use crate::dialect::SqlDialect;
use crate::statement::Statement;
use crate::value::SqlValue;

/// Pool-backed context for the engines sqlx drives through `Any`.
#[derive(Debug, Clone)]
pub struct AnyContext {
    pool: AnyPool,
    dialect: SqlDialect,
    provider: &'static str,
    command_timeout: Duration,
}

impl AnyContext {
    /// Connect a pool, retrying failed attempts with linear backoff.
    ///
    /// An in-memory SQLite database lives and dies with its connection, so
    /// such pools are pinned to a single connection that is never recycled.
    pub async fn connect(
        provider: &'static str,
        dialect: SqlDialect,
        url: &str,
        pool: &PoolSettings,
        resilience: &ResilienceSettings,
    ) -> AppResult<Self> {
        sqlx::any::install_default_drivers();

        let in_memory = dialect == SqlDialect::Sqlite && url.contains(":memory:");
        let max_connections = if in_memory || pool.shared_connection {
            1
        } else {
            pool.max_connections
        };

        info!(
            provider,
            url = %mask_password(url),
            max_connections,
            min_connections = pool.min_connections,
            "Connecting relational pool"
        );

        let pool = retry(provider, resilience, move || async move {
            let mut options = AnyPoolOptions::new()
                .max_connections(max_connections)
                .min_connections(pool.min_connections.min(max_connections))
                .acquire_timeout(Duration::from_secs(pool.connect_timeout_seconds));
            options = if in_memory {
                options.idle_timeout(None).max_lifetime(None)
            } else {
                options.idle_timeout(Duration::from_secs(pool.idle_timeout_seconds))
            };
            options
                .connect(url)
                .await
                .map_err(|e| map_error(e, "Failed to connect to database"))
        })
        .await?;

        info!(provider, "Successfully connected relational pool");
        Ok(Self {
            pool,
            dialect,
            provider,
            command_timeout: Duration::from_secs(resilience.command_timeout_seconds),
        })
    }

    /// The underlying sqlx pool.
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }
}

#[async_trait]
impl SqlContext for AnyContext {
    fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    fn provider(&self) -> &'static str {
        self.provider
    }

    async fn acquire(&self) -> AppResult<Box<dyn SqlExecutor>> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_error(e, "Failed to acquire connection"))?;
        Ok(Box::new(AnyPooled {
            conn,
            dialect: self.dialect,
            timeout: self.command_timeout,
        }))
    }

    async fn begin(&self) -> AppResult<Box<dyn SqlSession>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_error(e, "Failed to begin transaction"))?;
        debug!(provider = self.provider, "Transaction started");
        Ok(Box::new(AnySession {
            tx,
            dialect: self.dialect,
            timeout: self.command_timeout,
        }))
    }

    async fn health_check(&self) -> AppResult<bool> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|v| v == 1)
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Health check failed", e))
    }

    async fn close(&self) -> AppResult<()> {
        self.pool.close().await;
        info!(provider = self.provider, "Database pool closed");
        Ok(())
    }
}

/// A pooled connection, returned to the pool on drop.
struct AnyPooled {
    conn: PoolConnection<Any>,
    dialect: SqlDialect,
    timeout: Duration,
}

#[async_trait]
impl SqlExecutor for AnyPooled {
    async fn execute(&mut self, statement: &Statement) -> AppResult<u64> {
        execute_on(&mut self.conn, statement, self.timeout).await
    }

    async fn fetch(
        &mut self,
        statement: &Statement,
        types: &[ColumnType],
    ) -> AppResult<Vec<Vec<SqlValue>>> {
        fetch_on(&mut self.conn, statement, types, self.dialect, self.timeout).await
    }
}

/// A transaction holding one pooled connection. sqlx rolls it back on drop.
struct AnySession {
    tx: Transaction<'static, Any>,
    dialect: SqlDialect,
    timeout: Duration,
}

#[async_trait]
impl SqlExecutor for AnySession {
    async fn execute(&mut self, statement: &Statement) -> AppResult<u64> {
        execute_on(&mut self.tx, statement, self.timeout).await
    }

    async fn fetch(
        &mut self,
        statement: &Statement,
        types: &[ColumnType],
    ) -> AppResult<Vec<Vec<SqlValue>>> {
        fetch_on(&mut self.tx, statement, types, self.dialect, self.timeout).await
    }
}

#[async_trait]
impl SqlSession for AnySession {
    fn executor(&mut self) -> &mut dyn SqlExecutor {
        self
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_error(e, "Failed to commit transaction"))
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        warn!("Rolling back transaction");
        self.tx
            .rollback()
            .await
            .map_err(|e| map_error(e, "Failed to roll back transaction"))
    }
}

type AnyQuery<'q> = sqlx::query::Query<'q, Any, sqlx::any::AnyArguments<'q>>;

fn bind<'q>(statement: &'q Statement) -> AnyQuery<'q> {
    let mut query = sqlx::query(&statement.sql);
    for param in &statement.params {
        query = match param {
            SqlValue::Null(ColumnType::Integer | ColumnType::Boolean) => query.bind(None::<i64>),
            SqlValue::Null(ColumnType::Float) => query.bind(None::<f64>),
            SqlValue::Null(_) => query.bind(None::<String>),
            SqlValue::Bool(b) => query.bind(i64::from(*b)),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Text(s) => query.bind(s.as_str()),
        };
    }
    query
}

async fn execute_on(
    conn: &mut AnyConnection,
    statement: &Statement,
    timeout: Duration,
) -> AppResult<u64> {
    with_timeout(timeout, &statement.sql, async {
        bind(statement)
            .execute(&mut *conn)
            .await
            .map(|result| result.rows_affected())
            .map_err(|e| map_error(e, "Statement failed"))
    })
    .await
}

async fn fetch_on(
    conn: &mut AnyConnection,
    statement: &Statement,
    types: &[ColumnType],
    dialect: SqlDialect,
    timeout: Duration,
) -> AppResult<Vec<Vec<SqlValue>>> {
    let rows = with_timeout(timeout, &statement.sql, async {
        bind(statement)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| map_error(e, "Query failed"))
    })
    .await?;
    rows.iter().map(|row| decode_row(row, types, dialect)).collect()
}

fn decode_row(row: &AnyRow, types: &[ColumnType], dialect: SqlDialect) -> AppResult<Vec<SqlValue>> {
    types
        .iter()
        .enumerate()
        .map(|(idx, column_type)| decode_column(row, idx, *column_type, dialect))
        .collect()
}

fn decode_column(
    row: &AnyRow,
    idx: usize,
    column_type: ColumnType,
    dialect: SqlDialect,
) -> AppResult<SqlValue> {
    let decode_err = |e: sqlx::Error| {
        AppError::with_source(
            ErrorKind::Serialization,
            format!("Failed to decode column {idx} as {column_type} ({dialect})"),
            e,
        )
    };
    let value = match column_type {
        ColumnType::Integer | ColumnType::Boolean => row
            .try_get::<Option<i64>, _>(idx)
            .map_err(decode_err)?
            .map(SqlValue::Int),
        ColumnType::Float => match row.try_get::<Option<f64>, _>(idx) {
            Ok(v) => v.map(SqlValue::Float),
            Err(_) => row
                .try_get::<Option<i64>, _>(idx)
                .map_err(decode_err)?
                .map(|i| SqlValue::Float(i as f64)),
        },
        ColumnType::Uuid | ColumnType::Text | ColumnType::Timestamp | ColumnType::Json => {
            // Binary-collated MySQL text can come back flagged as a blob.
            match row.try_get::<Option<String>, _>(idx) {
                Ok(v) => v.map(SqlValue::Text),
                Err(_) => row
                    .try_get::<Option<Vec<u8>>, _>(idx)
                    .map_err(decode_err)?
                    .map(|bytes| {
                        String::from_utf8(bytes).map(SqlValue::Text).map_err(|e| {
                            AppError::with_source(
                                ErrorKind::Serialization,
                                format!("Column {idx} is not valid UTF-8"),
                                e,
                            )
                        })
                    })
                    .transpose()?,
            }
        }
    };
    Ok(value.unwrap_or(SqlValue::Null(column_type)))
}

/// Map a sqlx error into an [`AppError`].
pub(crate) fn map_error(err: sqlx::Error, context: &str) -> AppError {
    let kind = match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => ErrorKind::Conflict,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            ErrorKind::ServiceUnavailable
        }
        sqlx::Error::Configuration(_) => ErrorKind::Configuration,
        sqlx::Error::Decode(_) | sqlx::Error::ColumnDecode { .. } => ErrorKind::Serialization,
        _ => ErrorKind::Database,
    };
    AppError::with_source(kind, format!("{context}: {err}"), err)
}
