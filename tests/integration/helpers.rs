//! Shared fixtures for the cross-provider integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use polystore::prelude::*;

static ARTICLE: LazyLock<EntitySchema> = LazyLock::new(|| {
    EntitySchema::builder("Article")
        .column("title", ColumnType::Text)
        .nullable("summary", ColumnType::Text)
        .nullable("views", ColumnType::Integer)
        .nullable("rating", ColumnType::Float)
        .column("published", ColumnType::Boolean)
        .nullable("published_at", ColumnType::Timestamp)
        .nullable("tags", ColumnType::Json)
        .auditable()
        .soft_deletable()
        .build()
});

/// Auditable, soft-deletable fixture covering every column type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    pub title: String,
    pub summary: Option<String>,
    pub views: Option<i64>,
    pub rating: Option<f64>,
    pub published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub tags: Option<Vec<String>>,
    #[serde(flatten)]
    pub audit: AuditStamp,
    #[serde(flatten)]
    pub deletion: SoftDeleteStamp,
}

impl Article {
    pub fn new(title: &str) -> Self {
        Self {
            id: Uuid::nil(),
            title: title.to_string(),
            summary: None,
            views: None,
            rating: None,
            published: false,
            published_at: None,
            tags: None,
            audit: AuditStamp::default(),
            deletion: SoftDeleteStamp::default(),
        }
    }

    pub fn views(mut self, views: i64) -> Self {
        self.views = Some(views);
        self
    }

    pub fn rating(mut self, rating: f64) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn summary(mut self, summary: &str) -> Self {
        self.summary = Some(summary.to_string());
        self
    }

    pub fn published(mut self) -> Self {
        self.published = true;
        self.published_at = Some(Utc::now());
        self
    }

    pub fn tags(mut self, tags: &[&str]) -> Self {
        self.tags = Some(tags.iter().map(|t| t.to_string()).collect());
        self
    }
}

impl Entity for Article {
    fn schema() -> &'static EntitySchema {
        &ARTICLE
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn set_id(&mut self, id: Uuid) {
        self.id = id;
    }

    fn as_auditable(&self) -> Option<&dyn Auditable> {
        Some(self)
    }

    fn as_auditable_mut(&mut self) -> Option<&mut dyn Auditable> {
        Some(self)
    }

    fn as_soft_deletable(&self) -> Option<&dyn SoftDeletable> {
        Some(self)
    }

    fn as_soft_deletable_mut(&mut self) -> Option<&mut dyn SoftDeletable> {
        Some(self)
    }
}

impl Auditable for Article {
    fn audit(&self) -> &AuditStamp {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut AuditStamp {
        &mut self.audit
    }
}

impl SoftDeletable for Article {
    fn deletion(&self) -> &SoftDeleteStamp {
        &self.deletion
    }

    fn deletion_mut(&mut self) -> &mut SoftDeleteStamp {
        &mut self.deletion
    }
}

static LABEL: LazyLock<EntitySchema> = LazyLock::new(|| {
    EntitySchema::builder("Label")
        .column("name", ColumnType::Text)
        .build()
});

/// Plain entity with no optional capabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub id: Uuid,
    pub name: String,
}

impl Label {
    pub fn new(name: &str) -> Self {
        Self {
            id: Uuid::nil(),
            name: name.to_string(),
        }
    }
}

impl Entity for Label {
    fn schema() -> &'static EntitySchema {
        &LABEL
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn set_id(&mut self, id: Uuid) {
        self.id = id;
    }
}

/// Route `tracing` output to the test harness; `RUST_LOG` controls the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Options with a random table prefix, isolating runs against shared servers.
pub fn isolated(provider: &str) -> RepositoryOptions {
    let mut options = RepositoryOptions::new(provider);
    let run = Uuid::new_v4().simple().to_string();
    options.naming.prefix = format!("t{}_", &run[..8]);
    options
}

pub async fn sqlite_memory() -> DataAccess {
    init_tracing();
    let mut options = RepositoryOptions::new("SQLite");
    options.sqlite.database_path = Some(":memory:".to_string());
    DataAccess::connect(options).await.unwrap()
}

pub async fn sqlite_file(path: &Path) -> DataAccess {
    init_tracing();
    let mut options = RepositoryOptions::new("SQLite");
    options.sqlite.database_path = Some(path.display().to_string());
    DataAccess::connect(options).await.unwrap()
}

pub async fn embedded_memory() -> DataAccess {
    init_tracing();
    let mut options = RepositoryOptions::new("LiteDB");
    options.lite_db.connection_string = Some(":memory:".to_string());
    DataAccess::connect(options).await.unwrap()
}

pub async fn embedded_dir(path: &Path) -> DataAccess {
    init_tracing();
    let mut options = RepositoryOptions::new("LiteDB");
    options.lite_db.connection_string = Some(path.display().to_string());
    DataAccess::connect(options).await.unwrap()
}

/// Connect a server-backed provider from the environment, or `None` when
/// the variable is unset.
pub async fn from_env(provider: &str, var: &str) -> Option<DataAccess> {
    let connection = std::env::var(var).ok()?;
    init_tracing();
    let mut options = isolated(provider);
    match provider {
        "MongoDB" => {
            options.mongodb.connection_string = Some(connection);
            options.mongodb.database_name = Some("polystore_tests".to_string());
        }
        "PostgreSQL" => options.postgresql.connection_string = Some(connection),
        "MySQL" => options.mysql.connection_string = Some(connection),
        "SqlServer" => options.sql_server.connection_string = Some(connection),
        other => panic!("no environment mapping for {other}"),
    }
    Some(DataAccess::connect(options).await.unwrap())
}

pub fn editor() -> AuditContext {
    AuditContext::new("editor")
}
