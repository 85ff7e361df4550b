//! Integration tests for the SQLite provider.

mod helpers;
#[macro_use]
mod contract;

use polystore::prelude::*;
use polystore_core::traits::storage::{StorageAdapter, StorageBackend};

use helpers::{Article, editor};

mod in_memory {
    contract_suite!(crate::helpers::sqlite_memory());
}

mod on_disk {
    use std::sync::LazyLock;

    use tempfile::TempDir;

    static DIR: LazyLock<TempDir> = LazyLock::new(|| tempfile::tempdir().unwrap());

    async fn setup() -> polystore::DataAccess {
        let path = DIR.path().join(format!("{}.db", uuid::Uuid::new_v4()));
        crate::helpers::sqlite_file(&path).await
    }

    contract_suite!(setup());
}

#[tokio::test]
async fn test_data_survives_reinstantiation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("persist.db");

    let first = helpers::sqlite_file(&path).await;
    let repo = first.repository::<Article>().await.unwrap();
    let created = repo
        .create(Article::new("durable").views(7), &editor())
        .await
        .unwrap();
    first.close().await.unwrap();

    let second = helpers::sqlite_file(&path).await;
    let repo = second.repository::<Article>().await.unwrap();
    assert_eq!(repo.get_by_id(created.id).await.unwrap(), Some(created));
    assert_eq!(repo.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_bulk_insert_above_threshold_is_atomic() {
    let mut options = RepositoryOptions::new("SQLite");
    options.sqlite.database_path = Some(":memory:".to_string());
    options.bulk_threshold = 5;
    let access = DataAccess::connect(options).await.unwrap();
    let repo = access.repository::<Article>().await.unwrap();

    let batch: Vec<Article> = (0..40).map(|i| Article::new(&format!("bulk {i}")).views(i)).collect();
    let created = repo.create_many(batch, &editor()).await.unwrap();
    assert_eq!(repo.count().await.unwrap(), 40);

    let mut retry: Vec<Article> = (0..12).map(|i| Article::new(&format!("retry {i}"))).collect();
    retry[11].id = created[3].id;
    let err = repo.create_many(retry, &editor()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
    assert_eq!(repo.count().await.unwrap(), 40);
}

#[tokio::test]
async fn test_table_name_follows_naming_rules() {
    let mut options = RepositoryOptions::new("sqlite");
    options.sqlite.database_path = Some(":memory:".to_string());
    options.naming.casing = NameCasing::Snake;
    options.naming.prefix = "app_".to_string();
    let access = DataAccess::connect(options).await.unwrap();

    let adapter = access.backend().collection(Article::schema()).await.unwrap();
    assert_eq!(adapter.name(), "app_articles");
    assert_eq!(access.provider(), "SQLite");
}

#[tokio::test]
async fn test_cancellation_aborts_before_storage() {
    let access = helpers::sqlite_memory().await;
    let repo = access.repository::<Article>().await.unwrap();
    let token = tokio_util::sync::CancellationToken::new();
    let cancellable = repo.with_cancellation(token.clone());
    token.cancel();

    let err = cancellable
        .create(Article::new("never"), &editor())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Cancelled);
    assert_eq!(repo.count().await.unwrap(), 0);
}
