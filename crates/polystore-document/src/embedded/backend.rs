//! Embedded store backend and configurator.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::info;

use polystore_core::config::RepositoryOptions;
use polystore_core::config::naming::NamingOptions;
use polystore_core::config::required_setting;
use polystore_core::entity::EntitySchema;
use polystore_core::error::{AppError, ErrorKind};
use polystore_core::result::AppResult;
use polystore_core::traits::provider::ProviderConfigurator;
use polystore_core::traits::storage::{StorageAdapter, StorageBackend};

use super::adapter::{EmbeddedAdapter, PROVIDER};
use super::engine::EmbeddedDatabase;

/// A connected embedded database.
#[derive(Debug)]
pub struct EmbeddedBackend {
    db: Arc<EmbeddedDatabase>,
    naming: NamingOptions,
    /// Opened collections keyed by entity name.
    adapters: DashMap<&'static str, Arc<EmbeddedAdapter>>,
}

impl EmbeddedBackend {
    /// Wrap an opened database.
    pub fn new(db: EmbeddedDatabase, naming: NamingOptions) -> Self {
        Self {
            db: Arc::new(db),
            naming,
            adapters: DashMap::new(),
        }
    }

    /// The underlying engine.
    pub fn database(&self) -> &EmbeddedDatabase {
        &self.db
    }
}

#[async_trait]
impl StorageBackend for EmbeddedBackend {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn collection(&self, schema: &'static EntitySchema) -> AppResult<Arc<dyn StorageAdapter>> {
        if let Some(adapter) = self.adapters.get(schema.name()) {
            return Ok(adapter.clone());
        }

        let name = self.naming.table_name(schema.name());
        let db = self.db.clone();
        let collection = name.clone();
        tokio::task::spawn_blocking(move || db.ensure_collection(&collection))
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Internal, "Embedded store task failed", e))??;

        info!(entity = schema.name(), collection = %name, "Opened embedded collection");
        let adapter = self
            .adapters
            .entry(schema.name())
            .or_insert_with(|| Arc::new(EmbeddedAdapter::new(self.db.clone(), name, schema)))
            .clone();
        Ok(adapter)
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(self.db.location().is_none_or(|dir| dir.is_dir()))
    }

    async fn close(&self) -> AppResult<()> {
        self.adapters.clear();
        info!("Embedded document database closed");
        Ok(())
    }
}

/// Configurator for the embedded document store.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedConfigurator;

#[async_trait]
impl ProviderConfigurator for EmbeddedConfigurator {
    fn provider_names(&self) -> &'static [&'static str] {
        &["LiteDB", "Embedded"]
    }

    fn validate(&self, options: &RepositoryOptions) -> AppResult<()> {
        required_setting(
            &options.lite_db.connection_string,
            "lite_db.connection_string",
            PROVIDER,
        )
        .map(|_| ())
    }

    async fn connect(&self, options: &RepositoryOptions) -> AppResult<Arc<dyn StorageBackend>> {
        let connection_string = required_setting(
            &options.lite_db.connection_string,
            "lite_db.connection_string",
            PROVIDER,
        )?
        .to_string();
        let db = tokio::task::spawn_blocking(move || EmbeddedDatabase::open(&connection_string))
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Internal, "Embedded store task failed", e))??;
        Ok(Arc::new(EmbeddedBackend::new(db, options.naming.clone())))
    }
}
