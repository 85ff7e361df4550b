//! Provider name to configurator lookup.

use std::sync::Arc;

use tracing::debug;

use polystore_core::error::AppError;
use polystore_core::result::AppResult;
use polystore_core::traits::provider::ProviderConfigurator;
use polystore_document::{EmbeddedConfigurator, MongoConfigurator};
use polystore_relational::{
    MySqlConfigurator, PostgresConfigurator, SqlServerConfigurator, SqliteConfigurator,
};

/// Ordered set of provider configurators.
///
/// The first configurator that accepts a name wins.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    configurators: Vec<Arc<dyn ProviderConfigurator>>,
}

impl ProviderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in provider.
    pub fn with_default_providers() -> Self {
        Self::new()
            .register(Arc::new(MongoConfigurator))
            .register(Arc::new(EmbeddedConfigurator))
            .register(Arc::new(SqliteConfigurator))
            .register(Arc::new(SqlServerConfigurator))
            .register(Arc::new(MySqlConfigurator))
            .register(Arc::new(PostgresConfigurator))
    }

    /// Append a configurator.
    pub fn register(mut self, configurator: Arc<dyn ProviderConfigurator>) -> Self {
        debug!(names = ?configurator.provider_names(), "Registered provider configurator");
        self.configurators.push(configurator);
        self
    }

    /// Every accepted provider name, in registration order.
    pub fn supported_names(&self) -> Vec<&'static str> {
        self.configurators
            .iter()
            .flat_map(|c| c.provider_names().iter().copied())
            .collect()
    }

    /// The configurator handling `provider`.
    pub fn resolve(&self, provider: &str) -> AppResult<Arc<dyn ProviderConfigurator>> {
        self.configurators
            .iter()
            .find(|c| c.can_handle_provider(provider))
            .cloned()
            .ok_or_else(|| {
                AppError::configuration(format!(
                    "Unsupported repository provider '{}'. Supported providers: {}",
                    provider.trim(),
                    self.supported_names().join(", ")
                ))
            })
    }
}
