//! MongoDB backend and configurator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use mongodb::bson::{Document, doc};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Database, IndexModel};
use tracing::info;

use polystore_core::config::RepositoryOptions;
use polystore_core::config::naming::NamingOptions;
use polystore_core::config::required_setting;
use polystore_core::entity::{EntitySchema, fields};
use polystore_core::error::{AppError, ErrorKind};
use polystore_core::result::AppResult;
use polystore_core::traits::provider::ProviderConfigurator;
use polystore_core::traits::storage::{StorageAdapter, StorageBackend};

use super::adapter::{MongoAdapter, PROVIDER};
use super::convert::{index_keys, map_error};

/// A connected MongoDB database.
#[derive(Debug)]
pub struct MongoBackend {
    client: Client,
    database: Database,
    naming: NamingOptions,
    /// Opened collections keyed by entity name.
    adapters: DashMap<&'static str, Arc<MongoAdapter>>,
}

impl MongoBackend {
    /// Wrap a connected client and the database holding the collections.
    pub fn new(client: Client, database_name: &str, naming: NamingOptions) -> Self {
        Self {
            database: client.database(database_name),
            client,
            naming,
            adapters: DashMap::new(),
        }
    }

    /// The database holding the entity collections.
    pub fn database(&self) -> &Database {
        &self.database
    }

    async fn ensure_indexes(
        &self,
        collection: &mongodb::Collection<Document>,
        schema: &EntitySchema,
    ) -> AppResult<()> {
        let unique_id = IndexModel::builder()
            .keys(index_keys(fields::ID))
            .options(IndexOptions::builder().unique(true).build())
            .build();
        collection
            .create_index(unique_id)
            .await
            .map_err(|e| map_error(e, "Failed to create id index"))?;

        if schema.is_soft_deletable() {
            let deleted = IndexModel::builder()
                .keys(index_keys(fields::IS_DELETED))
                .build();
            collection
                .create_index(deleted)
                .await
                .map_err(|e| map_error(e, "Failed to create is_deleted index"))?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for MongoBackend {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn collection(&self, schema: &'static EntitySchema) -> AppResult<Arc<dyn StorageAdapter>> {
        if let Some(adapter) = self.adapters.get(schema.name()) {
            return Ok(adapter.clone());
        }

        let name = self.naming.table_name(schema.name());
        let collection = self.database.collection::<Document>(&name);
        self.ensure_indexes(&collection, schema).await?;
        info!(entity = schema.name(), collection = %name, "Opened MongoDB collection");

        let adapter = self
            .adapters
            .entry(schema.name())
            .or_insert_with(|| Arc::new(MongoAdapter::new(self.client.clone(), collection, schema)))
            .clone();
        Ok(adapter)
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.database
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| true)
            .map_err(|e| map_error(e, "MongoDB health check failed"))
    }

    async fn close(&self) -> AppResult<()> {
        self.adapters.clear();
        self.client.clone().shutdown().await;
        info!("MongoDB client shut down");
        Ok(())
    }
}

/// Configurator for MongoDB.
#[derive(Debug, Default, Clone, Copy)]
pub struct MongoConfigurator;

#[async_trait]
impl ProviderConfigurator for MongoConfigurator {
    fn provider_names(&self) -> &'static [&'static str] {
        &["MongoDB", "Mongo"]
    }

    fn validate(&self, options: &RepositoryOptions) -> AppResult<()> {
        let settings = &options.mongodb;
        required_setting(&settings.connection_string, "mongodb.connection_string", PROVIDER)?;
        required_setting(&settings.database_name, "mongodb.database_name", PROVIDER)?;
        Ok(())
    }

    async fn connect(&self, options: &RepositoryOptions) -> AppResult<Arc<dyn StorageBackend>> {
        let settings = &options.mongodb;
        let uri = required_setting(&settings.connection_string, "mongodb.connection_string", PROVIDER)?;
        let database_name =
            required_setting(&settings.database_name, "mongodb.database_name", PROVIDER)?;

        let mut client_options = ClientOptions::parse(uri).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Configuration,
                format!("Invalid MongoDB connection string: {e}"),
                e,
            )
        })?;
        if let Some(seconds) = settings.connect_timeout_seconds {
            client_options.connect_timeout = Some(Duration::from_secs(seconds));
            client_options.server_selection_timeout = Some(Duration::from_secs(seconds));
        }
        if let Some(size) = settings.max_pool_size {
            client_options.max_pool_size = Some(size);
        }
        client_options.app_name = Some("polystore".to_string());

        info!(database = database_name, "Connecting to MongoDB");
        let client = Client::with_options(client_options)
            .map_err(|e| map_error(e, "Failed to create MongoDB client"))?;
        let backend = MongoBackend::new(client, database_name, options.naming.clone());
        backend.health_check().await?;
        info!(database = database_name, "Successfully connected to MongoDB");
        Ok(Arc::new(backend))
    }
}
