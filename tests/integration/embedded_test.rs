//! Integration tests for the embedded document store (LiteDB provider).

mod helpers;
#[macro_use]
mod contract;

use polystore::prelude::*;

use helpers::{Article, Label, editor};

mod in_memory {
    contract_suite!(crate::helpers::embedded_memory());
}

mod in_directory {
    use std::sync::LazyLock;

    use tempfile::TempDir;

    static DIR: LazyLock<TempDir> = LazyLock::new(|| tempfile::tempdir().unwrap());

    async fn setup() -> polystore::DataAccess {
        let path = DIR.path().join(uuid::Uuid::new_v4().to_string());
        crate::helpers::embedded_dir(&path).await
    }

    contract_suite!(setup());
}

#[tokio::test]
async fn test_data_survives_reinstantiation() {
    let dir = tempfile::tempdir().unwrap();

    let first = helpers::embedded_dir(dir.path()).await;
    let articles = first.repository::<Article>().await.unwrap();
    let labels = first.repository::<Label>().await.unwrap();
    let article = articles
        .create(Article::new("durable").tags(&["a", "b"]), &editor())
        .await
        .unwrap();
    let label = labels.create(Label::new("kept"), &editor()).await.unwrap();
    articles.soft_delete(article.id, &editor()).await.unwrap();
    first.close().await.unwrap();

    let second = helpers::embedded_dir(dir.path()).await;
    let articles = second.repository::<Article>().await.unwrap();
    let labels = second.repository::<Label>().await.unwrap();
    assert_eq!(articles.count().await.unwrap(), 0);
    let restored = articles.restore(article.id).await.unwrap().unwrap();
    assert_eq!(restored.tags, article.tags);
    assert_eq!(labels.get_by_id(label.id).await.unwrap(), Some(label));
}

#[tokio::test]
async fn test_alias_and_case_insensitive_provider_name() {
    let mut options = RepositoryOptions::new("  embedded ");
    options.lite_db.connection_string = Some(":memory:".to_string());
    let access = DataAccess::connect(options).await.unwrap();
    assert!(access.health_check().await);
    let repo = access.repository::<Label>().await.unwrap();
    assert!(repo.get_all().await.unwrap().is_empty());
}
