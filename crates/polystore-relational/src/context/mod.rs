//! Backing contexts: the engine-specific half of the relational adapter.
//!
//! A context hands out executors (a pooled connection, or the shared SQL
//! Server connection) and transactional sessions. The adapter only ever
//! speaks [`Statement`]s and [`SqlValue`]s.

pub mod any;
pub mod mssql;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use polystore_core::entity::ColumnType;
use polystore_core::error::AppError;
use polystore_core::result::AppResult;

use crate::dialect::SqlDialect;
use crate::statement::Statement;
use crate::value::SqlValue;

/// Something statements can run on.
#[async_trait]
pub trait SqlExecutor: Send {
    /// Run a statement and return the number of affected rows.
    async fn execute(&mut self, statement: &Statement) -> AppResult<u64>;

    /// Run a query and decode every row using `types`, one per selected column.
    async fn fetch(
        &mut self,
        statement: &Statement,
        types: &[ColumnType],
    ) -> AppResult<Vec<Vec<SqlValue>>>;

    /// Run a query returning a single integer.
    async fn fetch_count(&mut self, statement: &Statement) -> AppResult<u64> {
        let rows = self.fetch(statement, &[ColumnType::Integer]).await?;
        match rows.into_iter().next().and_then(|row| row.into_iter().next()) {
            Some(SqlValue::Int(n)) => Ok(u64::try_from(n).unwrap_or(0)),
            other => Err(AppError::database(format!(
                "Expected a row count, got {other:?}"
            ))),
        }
    }
}

/// An open transaction. Dropping it without committing rolls it back.
#[async_trait]
pub trait SqlSession: SqlExecutor {
    /// View the session as a plain executor.
    fn executor(&mut self) -> &mut dyn SqlExecutor;

    /// Make the session's writes durable.
    async fn commit(self: Box<Self>) -> AppResult<()>;

    /// Discard the session's writes.
    async fn rollback(self: Box<Self>) -> AppResult<()>;
}

/// A connected relational engine.
#[async_trait]
pub trait SqlContext: Send + Sync + fmt::Debug + 'static {
    /// SQL flavour of the engine.
    fn dialect(&self) -> SqlDialect;

    /// Provider name reported by adapters built on this context.
    fn provider(&self) -> &'static str;

    /// Borrow a connection for non-transactional work.
    async fn acquire(&self) -> AppResult<Box<dyn SqlExecutor>>;

    /// Open a transaction.
    async fn begin(&self) -> AppResult<Box<dyn SqlSession>>;

    /// Check that the engine answers `SELECT 1`.
    async fn health_check(&self) -> AppResult<bool>;

    /// Close every connection.
    async fn close(&self) -> AppResult<()>;
}

/// Bound `future` by the command timeout.
pub(crate) async fn with_timeout<T>(
    timeout: Duration,
    sql: &str,
    future: impl Future<Output = AppResult<T>>,
) -> AppResult<T> {
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(AppError::service_unavailable(format!(
            "Statement timed out after {}s: {}",
            timeout.as_secs(),
            truncate(sql)
        ))),
    }
}

fn truncate(sql: &str) -> &str {
    match sql.char_indices().nth(120) {
        Some((end, _)) => &sql[..end],
        None => sql,
    }
}
