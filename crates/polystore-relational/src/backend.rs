//! Relational backend: one context, one adapter per entity table.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::info;

use polystore_core::config::naming::NamingOptions;
use polystore_core::entity::EntitySchema;
use polystore_core::result::AppResult;
use polystore_core::traits::storage::{StorageAdapter, StorageBackend};

use crate::adapter::SqlAdapter;
use crate::context::SqlContext;
use crate::statement::SqlTable;

/// A connected relational engine.
#[derive(Debug)]
pub struct SqlBackend {
    context: Arc<dyn SqlContext>,
    naming: NamingOptions,
    /// Database schema holding the tables, when the engine has one.
    db_schema: Option<String>,
    bulk_threshold: usize,
    /// Tables already ensured, keyed by entity name.
    adapters: DashMap<&'static str, Arc<SqlAdapter>>,
}

impl SqlBackend {
    /// Wrap a connected context.
    pub fn new(
        context: Arc<dyn SqlContext>,
        naming: NamingOptions,
        db_schema: Option<String>,
        bulk_threshold: usize,
    ) -> Self {
        Self {
            context,
            naming,
            db_schema,
            bulk_threshold,
            adapters: DashMap::new(),
        }
    }

    /// The backing context.
    pub fn context(&self) -> &Arc<dyn SqlContext> {
        &self.context
    }
}

#[async_trait]
impl StorageBackend for SqlBackend {
    fn provider(&self) -> &str {
        self.context.provider()
    }

    async fn collection(&self, schema: &'static EntitySchema) -> AppResult<Arc<dyn StorageAdapter>> {
        if let Some(adapter) = self.adapters.get(schema.name()) {
            return Ok(adapter.clone());
        }

        let name = self.naming.table_name(schema.name());
        let table = SqlTable::new(
            self.context.dialect(),
            self.db_schema.as_deref(),
            name.clone(),
            schema,
        );
        self.context
            .acquire()
            .await?
            .execute(&table.create_table())
            .await?;
        info!(
            provider = self.context.provider(),
            entity = schema.name(),
            table = %name,
            "Ensured table"
        );

        let adapter = self
            .adapters
            .entry(schema.name())
            .or_insert_with(|| {
                Arc::new(SqlAdapter::new(
                    table,
                    self.context.clone(),
                    self.bulk_threshold,
                ))
            })
            .clone();
        Ok(adapter)
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.context.health_check().await
    }

    async fn close(&self) -> AppResult<()> {
        self.adapters.clear();
        self.context.close().await
    }
}
