//! Repository configuration schemas.
//!
//! [`RepositoryOptions`] carries the selected provider name plus one settings
//! block per supported engine. Only the block matching the selected provider
//! has to be populated; the others are inert.

pub mod document;
pub mod naming;
pub mod relational;

use serde::{Deserialize, Serialize};

use self::document::{LiteDbSettings, MongoDbSettings};
use self::naming::NamingOptions;
use self::relational::{MySqlSettings, PostgresSettings, SqlServerSettings, SqliteSettings};

use crate::error::AppError;
use crate::result::AppResult;

/// Root configuration for the data-access layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryOptions {
    /// Provider name, matched case-insensitively (`"MongoDB"`, `"SQLite"`, ...).
    pub provider: String,
    /// Table / collection naming rules shared by every engine.
    #[serde(default)]
    pub naming: NamingOptions,
    /// Batch size above which relational adapters switch to multi-row inserts.
    #[serde(default = "default_bulk_threshold")]
    pub bulk_threshold: usize,
    /// MongoDB settings.
    #[serde(default)]
    pub mongodb: MongoDbSettings,
    /// Embedded document store settings.
    #[serde(default)]
    pub lite_db: LiteDbSettings,
    /// SQLite settings.
    #[serde(default)]
    pub sqlite: SqliteSettings,
    /// SQL Server settings.
    #[serde(default)]
    pub sql_server: SqlServerSettings,
    /// MySQL / MariaDB settings.
    #[serde(default)]
    pub mysql: MySqlSettings,
    /// PostgreSQL settings.
    #[serde(default)]
    pub postgresql: PostgresSettings,
}

impl RepositoryOptions {
    /// Create options for the given provider with every engine block defaulted.
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            naming: NamingOptions::default(),
            bulk_threshold: default_bulk_threshold(),
            mongodb: MongoDbSettings::default(),
            lite_db: LiteDbSettings::default(),
            sqlite: SqliteSettings::default(),
            sql_server: SqlServerSettings::default(),
            mysql: MySqlSettings::default(),
            postgresql: PostgresSettings::default(),
        }
    }

    /// Load options from a configuration file and the environment.
    ///
    /// The file is optional; variables prefixed with `POLYSTORE__` override
    /// it (for example `POLYSTORE__SQLITE__DATABASE_PATH`).
    pub fn load(path: &str) -> AppResult<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("POLYSTORE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }
}

/// Return the value of a required string setting or a configuration error
/// naming the missing field.
pub fn required_setting<'a>(
    value: &'a Option<String>,
    field: &str,
    provider: &str,
) -> AppResult<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::configuration(format!(
            "Missing required setting '{field}' for provider '{provider}'"
        ))),
    }
}

fn default_bulk_threshold() -> usize {
    1000
}
