//! Storage adapter over the embedded engine.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use polystore_core::entity::{EntitySchema, Record};
use polystore_core::error::{AppError, ErrorKind};
use polystore_core::result::AppResult;
use polystore_core::traits::storage::{AdapterTransaction, StorageAdapter, StoreQuery};
use polystore_core::types::filter::Filter;
use polystore_core::types::update::FieldUpdates;

use super::engine::{Documents, EmbeddedDatabase};
use super::ops;

/// Provider name reported by embedded adapters.
pub(crate) const PROVIDER: &str = "LiteDB";

/// One collection of an [`EmbeddedDatabase`].
///
/// The engine is synchronous; every call runs on the blocking thread pool.
#[derive(Debug, Clone)]
pub struct EmbeddedAdapter {
    db: Arc<EmbeddedDatabase>,
    name: String,
    schema: &'static EntitySchema,
}

impl EmbeddedAdapter {
    pub(crate) fn new(db: Arc<EmbeddedDatabase>, name: String, schema: &'static EntitySchema) -> Self {
        Self { db, name, schema }
    }

    async fn blocking<R, F>(&self, f: F) -> AppResult<R>
    where
        F: FnOnce(&EmbeddedDatabase, &str) -> AppResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.db.clone();
        let name = self.name.clone();
        tokio::task::spawn_blocking(move || f(&db, &name))
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Internal, "Embedded store task failed", e))?
    }
}

#[async_trait]
impl StorageAdapter for EmbeddedAdapter {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> &'static EntitySchema {
        self.schema
    }

    async fn insert(&self, records: &[Record]) -> AppResult<()> {
        debug!(collection = %self.name, count = records.len(), "Embedded insert");
        let records = records.to_vec();
        self.blocking(move |db, name| db.write(name, |docs| ops::insert(docs, &records)))
            .await
    }

    async fn replace(&self, records: &[Record]) -> AppResult<Vec<Uuid>> {
        debug!(collection = %self.name, count = records.len(), "Embedded replace");
        let records = records.to_vec();
        self.blocking(move |db, name| db.write(name, |docs| ops::replace(docs, &records)))
            .await
    }

    async fn select(&self, query: &StoreQuery) -> AppResult<Vec<Record>> {
        let query = query.clone();
        self.blocking(move |db, name| db.read(name, |docs| ops::select(docs, &query)))
            .await
    }

    async fn count(&self, filter: Option<&Filter>) -> AppResult<u64> {
        let filter = filter.cloned();
        self.blocking(move |db, name| db.read(name, |docs| ops::count(docs, filter.as_ref())))
            .await
    }

    async fn remove(&self, ids: &[Uuid]) -> AppResult<u64> {
        debug!(collection = %self.name, count = ids.len(), "Embedded remove");
        let ids = ids.to_vec();
        self.blocking(move |db, name| db.write(name, |docs| Ok(ops::remove(docs, &ids))))
            .await
    }

    async fn update_fields(
        &self,
        filter: Option<&Filter>,
        updates: &FieldUpdates,
    ) -> AppResult<u64> {
        let filter = filter.cloned();
        let updates = updates.clone();
        self.blocking(move |db, name| {
            db.write(name, |docs| {
                Ok(ops::update_fields(docs, filter.as_ref(), &updates))
            })
        })
        .await
    }

    async fn begin(&self) -> AppResult<Arc<dyn AdapterTransaction>> {
        let (documents, base_version) = self.blocking(|db, name| db.snapshot(name)).await?;
        debug!(collection = %self.name, base_version, "Embedded transaction started");
        Ok(Arc::new(EmbeddedTransaction {
            adapter: self.clone(),
            staged: Mutex::new(Some(Staged {
                documents,
                base_version,
                dirty: false,
            })),
        }))
    }
}

#[derive(Debug)]
struct Staged {
    documents: Documents,
    base_version: u64,
    dirty: bool,
}

/// A private copy of a collection, committed with an optimistic version
/// check.
#[derive(Debug)]
pub struct EmbeddedTransaction {
    adapter: EmbeddedAdapter,
    staged: Mutex<Option<Staged>>,
}

impl EmbeddedTransaction {
    fn with_staged<R>(&self, write: bool, f: impl FnOnce(&mut Documents) -> AppResult<R>) -> AppResult<R> {
        let mut guard = self
            .staged
            .lock()
            .map_err(|_| AppError::internal("Embedded transaction lock poisoned"))?;
        let staged = guard
            .as_mut()
            .ok_or_else(|| AppError::transaction("Transaction already completed"))?;
        let result = f(&mut staged.documents)?;
        staged.dirty |= write;
        Ok(result)
    }

    fn take(&self) -> AppResult<Staged> {
        self.staged
            .lock()
            .map_err(|_| AppError::internal("Embedded transaction lock poisoned"))?
            .take()
            .ok_or_else(|| AppError::transaction("Transaction already completed"))
    }
}

#[async_trait]
impl StorageAdapter for EmbeddedTransaction {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn name(&self) -> &str {
        &self.adapter.name
    }

    fn schema(&self) -> &'static EntitySchema {
        self.adapter.schema
    }

    async fn insert(&self, records: &[Record]) -> AppResult<()> {
        self.with_staged(true, |docs| ops::insert(docs, records))
    }

    async fn replace(&self, records: &[Record]) -> AppResult<Vec<Uuid>> {
        self.with_staged(true, |docs| ops::replace(docs, records))
    }

    async fn select(&self, query: &StoreQuery) -> AppResult<Vec<Record>> {
        self.with_staged(false, |docs| Ok(ops::select(docs, query)))
    }

    async fn count(&self, filter: Option<&Filter>) -> AppResult<u64> {
        self.with_staged(false, |docs| Ok(ops::count(docs, filter)))
    }

    async fn remove(&self, ids: &[Uuid]) -> AppResult<u64> {
        self.with_staged(true, |docs| Ok(ops::remove(docs, ids)))
    }

    async fn update_fields(
        &self,
        filter: Option<&Filter>,
        updates: &FieldUpdates,
    ) -> AppResult<u64> {
        self.with_staged(true, |docs| Ok(ops::update_fields(docs, filter, updates)))
    }

    async fn begin(&self) -> AppResult<Arc<dyn AdapterTransaction>> {
        Err(AppError::not_supported(
            "Nested transactions are not supported by the embedded store",
        ))
    }
}

#[async_trait]
impl AdapterTransaction for EmbeddedTransaction {
    async fn commit(&self) -> AppResult<()> {
        let staged = self.take()?;
        if !staged.dirty {
            return Ok(());
        }
        let Staged {
            documents,
            base_version,
            ..
        } = staged;
        self.adapter
            .blocking(move |db, name| db.commit(name, base_version, documents))
            .await?;
        debug!(collection = %self.adapter.name, "Embedded transaction committed");
        Ok(())
    }

    async fn rollback(&self) -> AppResult<()> {
        self.take()?;
        warn!(collection = %self.adapter.name, "Embedded transaction rolled back");
        Ok(())
    }

    fn into_adapter(self: Arc<Self>) -> Arc<dyn StorageAdapter> {
        self
    }
}
