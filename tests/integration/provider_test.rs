//! Integration tests for provider selection and configuration loading.

mod helpers;

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;

use polystore::prelude::*;
use polystore::ProviderRegistry;
use polystore_core::traits::provider::ProviderConfigurator;
use polystore_core::traits::storage::StorageBackend;
use polystore_document::{EmbeddedBackend, EmbeddedDatabase};

use helpers::{Label, editor};

#[tokio::test]
async fn test_unsupported_provider_is_rejected_with_the_supported_list() {
    let err = DataAccess::connect(RepositoryOptions::new("Oracle"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Configuration);
    assert!(err.message.contains("'Oracle'"), "{}", err.message);
    for name in [
        "MongoDB", "Mongo", "LiteDB", "Embedded", "SQLite", "SqlServer", "MSSQL", "MySQL",
        "MariaDB", "PostgreSQL", "Postgres",
    ] {
        assert!(err.message.contains(name), "{name} missing from {}", err.message);
    }
}

#[tokio::test]
async fn test_missing_settings_name_the_field() {
    let cases = [
        ("SQLite", "sqlite.database_path"),
        ("LiteDB", "lite_db.connection_string"),
        ("MongoDB", "mongodb.connection_string"),
        ("MySQL", "mysql.connection_string"),
        ("PostgreSQL", "postgresql.connection_string"),
        ("SqlServer", "sql_server.connection_string"),
    ];
    for (provider, field) in cases {
        let err = DataAccess::connect(RepositoryOptions::new(provider))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration, "{provider}");
        assert!(err.message.contains(field), "{provider}: {}", err.message);
    }
}

#[tokio::test]
async fn test_options_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("repository.toml");
    let mut file = std::fs::File::create(&config_path).unwrap();
    writeln!(
        file,
        r#"
provider = "sqlite"
bulk_threshold = 50

[naming]
casing = "snake"
prefix = "cms_"

[sqlite]
database_path = ":memory:"
"#
    )
    .unwrap();

    let access = DataAccess::from_file(config_path.to_str().unwrap())
        .await
        .unwrap();
    assert_eq!(access.provider(), "SQLite");
    assert_eq!(access.options().bulk_threshold, 50);
    assert_eq!(access.options().naming.casing, NameCasing::Snake);

    let repo = access.repository::<Label>().await.unwrap();
    repo.create(Label::new("from file"), &editor()).await.unwrap();
    assert_eq!(repo.count().await.unwrap(), 1);
}

/// Configurator answering to a custom name with an in-memory embedded store.
#[derive(Debug)]
struct ScratchConfigurator;

#[async_trait]
impl ProviderConfigurator for ScratchConfigurator {
    fn provider_names(&self) -> &'static [&'static str] {
        &["Scratch"]
    }

    fn validate(&self, _options: &RepositoryOptions) -> AppResult<()> {
        Ok(())
    }

    async fn connect(&self, options: &RepositoryOptions) -> AppResult<Arc<dyn StorageBackend>> {
        Ok(Arc::new(EmbeddedBackend::new(
            EmbeddedDatabase::in_memory(),
            options.naming.clone(),
        )))
    }
}

#[tokio::test]
async fn test_custom_registry_resolves_registered_configurators() {
    let registry = ProviderRegistry::with_default_providers().register(Arc::new(ScratchConfigurator));
    assert!(registry.supported_names().contains(&"Scratch"));

    let access = DataAccess::connect_with(&registry, RepositoryOptions::new("scratch"))
        .await
        .unwrap();
    let repo = access.repository::<Label>().await.unwrap();
    let created = repo.create(Label::new("custom"), &editor()).await.unwrap();
    assert_eq!(repo.get_by_id(created.id).await.unwrap(), Some(created));

    let err = DataAccess::connect_with(&ProviderRegistry::new(), RepositoryOptions::new("SQLite"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Configuration);
}

#[tokio::test]
async fn test_repositories_share_one_backend() {
    let access = helpers::sqlite_memory().await;
    let cloned = access.clone();

    let writer = access.repository::<Label>().await.unwrap();
    let reader = cloned.repository::<Label>().await.unwrap();
    let created = writer.create(Label::new("shared"), &editor()).await.unwrap();
    assert_eq!(reader.get_by_id(created.id).await.unwrap(), Some(created));
    assert!(Arc::ptr_eq(access.backend(), cloned.backend()));
}
