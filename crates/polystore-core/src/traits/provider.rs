//! Provider configurator trait.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::RepositoryOptions;
use crate::result::AppResult;

use super::storage::StorageBackend;

/// Binds a provider name to a storage engine.
///
/// Configurators are stateless. The registry asks each one in registration
/// order whether it handles the configured name, validates the matching
/// settings block, then connects once.
#[async_trait]
pub trait ProviderConfigurator: Send + Sync + fmt::Debug + 'static {
    /// Names this configurator answers to. The first one is canonical.
    fn provider_names(&self) -> &'static [&'static str];

    /// Whether `provider` names this configurator (case-insensitive).
    fn can_handle_provider(&self, provider: &str) -> bool {
        let provider = provider.trim();
        self.provider_names()
            .iter()
            .any(|name| name.eq_ignore_ascii_case(provider))
    }

    /// Check that the required settings are present.
    fn validate(&self, options: &RepositoryOptions) -> AppResult<()>;

    /// Connect the backing engine.
    async fn connect(&self, options: &RepositoryOptions) -> AppResult<Arc<dyn StorageBackend>>;
}
