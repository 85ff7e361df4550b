//! SQL Server context over a single tiberius connection.
//!
//! tiberius has no pool, so every caller shares one connection behind an
//! async mutex. A session keeps the lock for its whole lifetime: other work
//! on the same context waits until the transaction ends.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tiberius::{Client, Config, Query, Row};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};

use polystore_core::config::relational::ResilienceSettings;
use polystore_core::entity::ColumnType;
use polystore_core::error::{AppError, ErrorKind};
use polystore_core::result::AppResult;

use super::{SqlContext, SqlExecutor, SqlSession, with_timeout};
use crate::connection::{mask_password, retry};
use crate::dialect::SqlDialect;
use crate::statement::Statement;
use crate::value::SqlValue;

type MssqlClient = Client<Compat<TcpStream>>;
type ClientGuard = OwnedMutexGuard<Option<MssqlClient>>;

const PROVIDER: &str = "SqlServer";

/// Context for SQL Server.
pub struct MssqlContext {
    client: Arc<Mutex<Option<MssqlClient>>>,
    command_timeout: Duration,
}

impl std::fmt::Debug for MssqlContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlContext")
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

impl MssqlContext {
    /// Connect from an ADO.NET style connection string.
    pub async fn connect(connection_string: &str, resilience: &ResilienceSettings) -> AppResult<Self> {
        let config = Config::from_ado_string(connection_string).map_err(|e| {
            AppError::with_source(
                ErrorKind::Configuration,
                format!("Invalid SQL Server connection string: {e}"),
                e,
            )
        })?;

        info!(
            provider = PROVIDER,
            connection = %mask_password(connection_string),
            "Connecting to SQL Server"
        );

        let client = retry(PROVIDER, resilience, || open(config.clone())).await?;

        info!(provider = PROVIDER, "Successfully connected to SQL Server");
        Ok(Self {
            client: Arc::new(Mutex::new(Some(client))),
            command_timeout: Duration::from_secs(resilience.command_timeout_seconds),
        })
    }

    async fn lock(&self) -> AppResult<ClientGuard> {
        let guard = self.client.clone().lock_owned().await;
        if guard.is_none() {
            return Err(closed());
        }
        Ok(guard)
    }
}

async fn open(config: Config) -> AppResult<MssqlClient> {
    let tcp = TcpStream::connect(config.get_addr()).await.map_err(|e| {
        AppError::with_source(
            ErrorKind::ServiceUnavailable,
            format!("Failed to reach SQL Server: {e}"),
            e,
        )
    })?;
    tcp.set_nodelay(true)?;
    Client::connect(config, tcp.compat_write())
        .await
        .map_err(|e| map_error(e, "Failed to connect to SQL Server"))
}

fn closed() -> AppError {
    AppError::service_unavailable("SQL Server connection is closed")
}

#[async_trait]
impl SqlContext for MssqlContext {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::SqlServer
    }

    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn acquire(&self) -> AppResult<Box<dyn SqlExecutor>> {
        Ok(Box::new(MssqlConnection {
            guard: self.lock().await?,
            timeout: self.command_timeout,
        }))
    }

    async fn begin(&self) -> AppResult<Box<dyn SqlSession>> {
        let mut conn = MssqlConnection {
            guard: self.lock().await?,
            timeout: self.command_timeout,
        };
        conn.execute(&Statement::raw("BEGIN TRANSACTION")).await?;
        debug!(provider = PROVIDER, "Transaction started");
        Ok(Box::new(MssqlSession { conn: Some(conn) }))
    }

    async fn health_check(&self) -> AppResult<bool> {
        let mut conn = self.acquire().await?;
        let rows = conn
            .fetch(&Statement::raw("SELECT CAST(1 AS BIGINT)"), &[ColumnType::Integer])
            .await?;
        Ok(matches!(rows.first().and_then(|r| r.first()), Some(SqlValue::Int(1))))
    }

    async fn close(&self) -> AppResult<()> {
        let client = self.client.lock().await.take();
        if let Some(client) = client {
            client
                .close()
                .await
                .map_err(|e| map_error(e, "Failed to close SQL Server connection"))?;
        }
        info!(provider = PROVIDER, "SQL Server connection closed");
        Ok(())
    }
}

/// Exclusive use of the shared connection.
struct MssqlConnection {
    guard: ClientGuard,
    timeout: Duration,
}

impl MssqlConnection {
    fn client(&mut self) -> AppResult<&mut MssqlClient> {
        self.guard.as_mut().ok_or_else(closed)
    }
}

fn query(statement: &Statement) -> Query<'_> {
    let mut query = Query::new(statement.sql.as_str());
    for param in &statement.params {
        match param {
            SqlValue::Null(ColumnType::Boolean) => query.bind(Option::<bool>::None),
            SqlValue::Null(ColumnType::Integer) => query.bind(Option::<i64>::None),
            SqlValue::Null(ColumnType::Float) => query.bind(Option::<f64>::None),
            SqlValue::Null(_) => query.bind(Option::<&str>::None),
            SqlValue::Bool(b) => query.bind(*b),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Text(s) => query.bind(s.as_str()),
        }
    }
    query
}

#[async_trait]
impl SqlExecutor for MssqlConnection {
    async fn execute(&mut self, statement: &Statement) -> AppResult<u64> {
        let timeout = self.timeout;
        let client = self.client()?;
        with_timeout(timeout, &statement.sql, async {
            query(statement)
                .execute(client)
                .await
                .map(|result| result.total())
                .map_err(|e| map_error(e, "Statement failed"))
        })
        .await
    }

    async fn fetch(
        &mut self,
        statement: &Statement,
        types: &[ColumnType],
    ) -> AppResult<Vec<Vec<SqlValue>>> {
        let timeout = self.timeout;
        let client = self.client()?;
        let rows = with_timeout(timeout, &statement.sql, async {
            query(statement)
                .query(client)
                .await
                .map_err(|e| map_error(e, "Query failed"))?
                .into_first_result()
                .await
                .map_err(|e| map_error(e, "Failed to read rows"))
        })
        .await?;
        rows.iter().map(|row| decode_row(row, types)).collect()
    }
}

/// An open SQL Server transaction.
///
/// Dropped without commit or rollback, it hands the connection to a
/// background task that rolls the transaction back before releasing the lock.
struct MssqlSession {
    conn: Option<MssqlConnection>,
}

impl MssqlSession {
    fn conn(&mut self) -> AppResult<&mut MssqlConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| AppError::transaction("Transaction already completed"))
    }

    async fn finish(mut self: Box<Self>, sql: &'static str) -> AppResult<()> {
        let mut conn = self
            .conn
            .take()
            .ok_or_else(|| AppError::transaction("Transaction already completed"))?;
        conn.execute(&Statement::raw(sql)).await.map(|_| ())
    }
}

#[async_trait]
impl SqlExecutor for MssqlSession {
    async fn execute(&mut self, statement: &Statement) -> AppResult<u64> {
        self.conn()?.execute(statement).await
    }

    async fn fetch(
        &mut self,
        statement: &Statement,
        types: &[ColumnType],
    ) -> AppResult<Vec<Vec<SqlValue>>> {
        self.conn()?.fetch(statement, types).await
    }
}

#[async_trait]
impl SqlSession for MssqlSession {
    fn executor(&mut self) -> &mut dyn SqlExecutor {
        self
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.finish("COMMIT TRANSACTION").await
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        warn!(provider = PROVIDER, "Rolling back transaction");
        self.finish("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION").await
    }
}

impl Drop for MssqlSession {
    fn drop(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            warn!(provider = PROVIDER, "Transaction dropped while open, rolling back");
            handle.spawn(async move {
                let rollback = Statement::raw("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION");
                if let Err(e) = conn.execute(&rollback).await {
                    warn!(provider = PROVIDER, error = %e, "Background rollback failed");
                }
            });
        }
    }
}

fn decode_row(row: &Row, types: &[ColumnType]) -> AppResult<Vec<SqlValue>> {
    types
        .iter()
        .enumerate()
        .map(|(idx, column_type)| {
            let decode_err = |e: tiberius::error::Error| {
                AppError::with_source(
                    ErrorKind::Serialization,
                    format!("Failed to decode column {idx} as {column_type}"),
                    e,
                )
            };
            let value = match column_type {
                ColumnType::Boolean => row
                    .try_get::<bool, _>(idx)
                    .map_err(decode_err)?
                    .map(SqlValue::Bool),
                ColumnType::Integer => row
                    .try_get::<i64, _>(idx)
                    .map_err(decode_err)?
                    .map(SqlValue::Int),
                ColumnType::Float => row
                    .try_get::<f64, _>(idx)
                    .map_err(decode_err)?
                    .map(SqlValue::Float),
                ColumnType::Uuid | ColumnType::Text | ColumnType::Timestamp | ColumnType::Json => row
                    .try_get::<&str, _>(idx)
                    .map_err(decode_err)?
                    .map(|s| SqlValue::Text(s.to_string())),
            };
            Ok(value.unwrap_or(SqlValue::Null(*column_type)))
        })
        .collect()
}

/// Map a tiberius error into an [`AppError`].
fn map_error(err: tiberius::error::Error, context: &str) -> AppError {
    use tiberius::error::Error as TdsError;

    let kind = match &err {
        // 2627: PRIMARY KEY / UNIQUE constraint, 2601: unique index.
        TdsError::Server(token) if matches!(token.code(), 2627 | 2601) => ErrorKind::Conflict,
        TdsError::Io { .. } | TdsError::Routing { .. } => ErrorKind::ServiceUnavailable,
        TdsError::Conversion(_) => ErrorKind::Serialization,
        _ => ErrorKind::Database,
    };
    AppError::with_source(kind, format!("{context}: {err}"), err)
}
