//! Provider configurators for the relational engines.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use polystore_core::config::relational::{PoolSettings, ResilienceSettings};
use polystore_core::config::document::IN_MEMORY;
use polystore_core::config::{RepositoryOptions, required_setting};
use polystore_core::result::AppResult;
use polystore_core::traits::provider::ProviderConfigurator;
use polystore_core::traits::storage::StorageBackend;

use crate::backend::SqlBackend;
use crate::connection::with_query_param;
use crate::context::SqlContext;
use crate::context::any::AnyContext;
use crate::context::mssql::MssqlContext;
use crate::dialect::SqlDialect;

/// Connect an sqlx `Any` backend.
async fn any_backend(
    provider: &'static str,
    dialect: SqlDialect,
    url: &str,
    db_schema: Option<String>,
    pool: &PoolSettings,
    resilience: &ResilienceSettings,
    options: &RepositoryOptions,
) -> AppResult<Arc<dyn StorageBackend>> {
    let context = AnyContext::connect(provider, dialect, url, pool, resilience).await?;
    let context: Arc<dyn SqlContext> = Arc::new(context);
    Ok(Arc::new(SqlBackend::new(
        context,
        options.naming.clone(),
        db_schema,
        options.bulk_threshold,
    )))
}

/// Build the sqlx URL for a SQLite database path.
pub fn sqlite_url(path: &str) -> String {
    if path == IN_MEMORY {
        "sqlite::memory:".to_string()
    } else if path.starts_with("sqlite:") {
        path.to_string()
    } else {
        format!("sqlite://{path}?mode=rwc")
    }
}

/// Configurator for SQLite.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteConfigurator;

#[async_trait]
impl ProviderConfigurator for SqliteConfigurator {
    fn provider_names(&self) -> &'static [&'static str] {
        &["SQLite"]
    }

    fn validate(&self, options: &RepositoryOptions) -> AppResult<()> {
        required_setting(&options.sqlite.database_path, "sqlite.database_path", "SQLite")?;
        Ok(())
    }

    async fn connect(&self, options: &RepositoryOptions) -> AppResult<Arc<dyn StorageBackend>> {
        let settings = &options.sqlite;
        let path = required_setting(&settings.database_path, "sqlite.database_path", "SQLite")?;
        info!(path, "Opening SQLite database");
        any_backend(
            "SQLite",
            SqlDialect::Sqlite,
            &sqlite_url(path),
            None,
            &settings.pool,
            &settings.resilience,
            options,
        )
        .await
    }
}

/// Configurator for MySQL and MariaDB.
#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlConfigurator;

#[async_trait]
impl ProviderConfigurator for MySqlConfigurator {
    fn provider_names(&self) -> &'static [&'static str] {
        &["MySQL", "MariaDB"]
    }

    fn validate(&self, options: &RepositoryOptions) -> AppResult<()> {
        required_setting(&options.mysql.connection_string, "mysql.connection_string", "MySQL")?;
        Ok(())
    }

    async fn connect(&self, options: &RepositoryOptions) -> AppResult<Arc<dyn StorageBackend>> {
        let settings = &options.mysql;
        let url = required_setting(&settings.connection_string, "mysql.connection_string", "MySQL")?;
        let url = match settings.ssl_mode.as_deref() {
            Some(mode) => with_query_param(url, "ssl-mode", mode),
            None => url.to_string(),
        };
        any_backend(
            "MySQL",
            SqlDialect::MySql,
            &url,
            None,
            &settings.pool,
            &settings.resilience,
            options,
        )
        .await
    }
}

/// Configurator for PostgreSQL.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresConfigurator;

#[async_trait]
impl ProviderConfigurator for PostgresConfigurator {
    fn provider_names(&self) -> &'static [&'static str] {
        &["PostgreSQL", "Postgres"]
    }

    fn validate(&self, options: &RepositoryOptions) -> AppResult<()> {
        required_setting(
            &options.postgresql.connection_string,
            "postgresql.connection_string",
            "PostgreSQL",
        )?;
        Ok(())
    }

    async fn connect(&self, options: &RepositoryOptions) -> AppResult<Arc<dyn StorageBackend>> {
        let settings = &options.postgresql;
        let url = required_setting(
            &settings.connection_string,
            "postgresql.connection_string",
            "PostgreSQL",
        )?;
        let url = match settings.ssl_mode.as_deref() {
            Some(mode) => with_query_param(url, "sslmode", mode),
            None => url.to_string(),
        };
        let context = AnyContext::connect(
            "PostgreSQL",
            SqlDialect::Postgres,
            &url,
            &settings.pool,
            &settings.resilience,
        )
        .await?;

        let schema = settings
            .schema
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        if let Some(schema) = &schema {
            let sql = format!(
                "CREATE SCHEMA IF NOT EXISTS {}",
                SqlDialect::Postgres.quote(schema)
            );
            sqlx::query(&sql)
                .execute(context.pool())
                .await
                .map_err(|e| crate::context::any::map_error(e, "Failed to create schema"))?;
            info!(schema = %schema, "Ensured PostgreSQL schema");
        }

        let context: Arc<dyn SqlContext> = Arc::new(context);
        Ok(Arc::new(SqlBackend::new(
            context,
            options.naming.clone(),
            schema,
            options.bulk_threshold,
        )))
    }
}

/// Configurator for SQL Server.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlServerConfigurator;

#[async_trait]
impl ProviderConfigurator for SqlServerConfigurator {
    fn provider_names(&self) -> &'static [&'static str] {
        &["SqlServer", "MSSQL"]
    }

    fn validate(&self, options: &RepositoryOptions) -> AppResult<()> {
        required_setting(
            &options.sql_server.connection_string,
            "sql_server.connection_string",
            "SqlServer",
        )?;
        Ok(())
    }

    async fn connect(&self, options: &RepositoryOptions) -> AppResult<Arc<dyn StorageBackend>> {
        let settings = &options.sql_server;
        let conn = required_setting(
            &settings.connection_string,
            "sql_server.connection_string",
            "SqlServer",
        )?;
        let context = MssqlContext::connect(conn, &settings.resilience).await?;
        let schema = settings
            .schema
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "dbo".to_string());

        let context: Arc<dyn SqlContext> = Arc::new(context);
        Ok(Arc::new(SqlBackend::new(
            context,
            options.naming.clone(),
            Some(schema),
            options.bulk_threshold,
        )))
    }
}
