//! Data-access bootstrap: validate, connect once, hand out repositories.

use std::sync::Arc;

use tracing::{info, warn};

use polystore_core::config::RepositoryOptions;
use polystore_core::entity::Entity;
use polystore_core::error::AppError;
use polystore_core::result::AppResult;
use polystore_core::traits::storage::StorageBackend;

use crate::factory::RepositoryFactory;
use crate::registry::ProviderRegistry;

/// A connected provider.
///
/// Cloning shares the connection. Every repository handed out for the same
/// entity type shares one table / collection adapter.
#[derive(Debug, Clone)]
pub struct DataAccess {
    backend: Arc<dyn StorageBackend>,
    options: Arc<RepositoryOptions>,
}

impl DataAccess {
    /// Connect the provider named in `options` using the built-in providers.
    pub async fn connect(options: RepositoryOptions) -> AppResult<Self> {
        Self::connect_with(&ProviderRegistry::with_default_providers(), options).await
    }

    /// Connect the provider named in `options` using `registry`.
    ///
    /// Fails with a configuration error for an unknown provider or a missing
    /// setting, before any connection is attempted.
    pub async fn connect_with(registry: &ProviderRegistry, options: RepositoryOptions) -> AppResult<Self> {
        let configurator = registry.resolve(&options.provider)?;
        configurator.validate(&options)?;

        let provider = configurator.provider_names().first().copied().ok_or_else(|| {
            AppError::configuration(format!(
                "Provider configurator for '{}' declares no provider name",
                options.provider
            ))
        })?;
        info!(
            provider,
            requested = %options.provider,
            bulk_threshold = options.bulk_threshold,
            "Connecting repository provider"
        );
        let backend = configurator.connect(&options).await?;
        info!(provider, "Repository provider ready");

        Ok(Self {
            backend,
            options: Arc::new(options),
        })
    }

    /// Load options from `path` (plus `POLYSTORE__` environment overrides)
    /// and connect.
    pub async fn from_file(path: &str) -> AppResult<Self> {
        Self::connect(RepositoryOptions::load(path)?).await
    }

    /// Wrap an already connected backend (for testing).
    pub fn from_backend(backend: Arc<dyn StorageBackend>, options: RepositoryOptions) -> Self {
        Self {
            backend,
            options: Arc::new(options),
        }
    }

    /// Repository for `T`, creating its table / collection on first use.
    pub async fn repository<T: Entity>(&self) -> AppResult<RepositoryFactory<T>> {
        let adapter = self.backend.collection(T::schema()).await?;
        Ok(RepositoryFactory::new(adapter))
    }

    /// The connected backend.
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// The options this provider was connected with.
    pub fn options(&self) -> &RepositoryOptions {
        &self.options
    }

    /// Provider name reported by the backend.
    pub fn provider(&self) -> &str {
        self.backend.provider()
    }

    /// Check that the engine is reachable. Failures are reported as `false`.
    pub async fn health_check(&self) -> bool {
        match self.backend.health_check().await {
            Ok(healthy) => healthy,
            Err(e) => {
                warn!(provider = self.provider(), error = %e, "Health check failed");
                false
            }
        }
    }

    /// Release the provider's connections.
    pub async fn close(&self) -> AppResult<()> {
        info!(provider = self.provider(), "Closing repository provider");
        self.backend.close().await
    }
}
