//! MongoDB storage adapter and session-backed transactions.

use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::Document;
use mongodb::options::FindOptions;
use mongodb::{Client, ClientSession, Collection};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use polystore_core::entity::{EntitySchema, Record, record_id};
use polystore_core::error::AppError;
use polystore_core::result::AppResult;
use polystore_core::traits::storage::{AdapterTransaction, StorageAdapter, StoreQuery};
use polystore_core::types::filter::Filter;
use polystore_core::types::update::FieldUpdates;

use super::convert::{
    filter_document, ids_document, map_error, set_document, sort_document, to_document, to_record,
};

/// Provider name reported by MongoDB adapters.
pub(crate) const PROVIDER: &str = "MongoDB";

/// One MongoDB collection. Every operation takes an optional session so the
/// adapter and its transactions share one code path.
#[derive(Debug, Clone)]
struct MongoCollection {
    client: Client,
    inner: Collection<Document>,
    name: String,
    schema: &'static EntitySchema,
}

impl MongoCollection {
    async fn insert(&self, records: &[Record], session: Option<&mut ClientSession>) -> AppResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let documents = records
            .iter()
            .map(to_document)
            .collect::<AppResult<Vec<_>>>()?;
        let action = self.inner.insert_many(documents);
        match session {
            Some(session) => action.session(session).await,
            None => action.await,
        }
        .map_err(|e| map_error(e, "Failed to insert documents"))?;
        Ok(())
    }

    async fn replace(
        &self,
        records: &[Record],
        mut session: Option<&mut ClientSession>,
    ) -> AppResult<Vec<Uuid>> {
        let mut replaced = Vec::new();
        for record in records {
            let id = record_id(record)?;
            let document = to_document(record)?;
            let action = self
                .inner
                .replace_one(ids_document([id.to_string()]), document);
            let result = match session.as_deref_mut() {
                Some(session) => action.session(session).await,
                None => action.await,
            }
            .map_err(|e| map_error(e, "Failed to replace document"))?;
            if result.matched_count > 0 {
                replaced.push(id);
            }
        }
        Ok(replaced)
    }

    async fn select(
        &self,
        query: &StoreQuery,
        session: Option<&mut ClientSession>,
    ) -> AppResult<Vec<Record>> {
        let mut options = FindOptions::default();
        options.sort = sort_document(&query.sort);
        options.skip = query.skip.map(|skip| skip.min(i64::MAX as u64));
        options.limit = query
            .limit
            .map(|limit| i64::try_from(limit).unwrap_or(i64::MAX));

        let action = self
            .inner
            .find(filter_document(query.filter.as_ref()))
            .with_options(options);
        let documents = match session {
            Some(session) => {
                let mut cursor = action
                    .session(&mut *session)
                    .await
                    .map_err(|e| map_error(e, "Failed to query documents"))?;
                let mut documents = Vec::new();
                while let Some(document) = cursor.next(&mut *session).await {
                    documents.push(document.map_err(|e| map_error(e, "Failed to read cursor"))?);
                }
                documents
            }
            None => action
                .await
                .map_err(|e| map_error(e, "Failed to query documents"))?
                .try_collect::<Vec<_>>()
                .await
                .map_err(|e| map_error(e, "Failed to read cursor"))?,
        };
        documents.into_iter().map(to_record).collect()
    }

    async fn count(
        &self,
        filter: Option<&Filter>,
        session: Option<&mut ClientSession>,
    ) -> AppResult<u64> {
        let action = self.inner.count_documents(filter_document(filter));
        match session {
            Some(session) => action.session(session).await,
            None => action.await,
        }
        .map_err(|e| map_error(e, "Failed to count documents"))
    }

    async fn remove(&self, ids: &[Uuid], session: Option<&mut ClientSession>) -> AppResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let action = self
            .inner
            .delete_many(ids_document(ids.iter().map(Uuid::to_string)));
        let result = match session {
            Some(session) => action.session(session).await,
            None => action.await,
        }
        .map_err(|e| map_error(e, "Failed to delete documents"))?;
        Ok(result.deleted_count)
    }

    async fn update_fields(
        &self,
        filter: Option<&Filter>,
        updates: &FieldUpdates,
        session: Option<&mut ClientSession>,
    ) -> AppResult<u64> {
        if updates.is_empty() {
            return self.count(filter, session).await;
        }
        let action = self
            .inner
            .update_many(filter_document(filter), set_document(updates));
        let result = match session {
            Some(session) => action.session(session).await,
            None => action.await,
        }
        .map_err(|e| map_error(e, "Failed to update documents"))?;
        Ok(result.matched_count)
    }
}

/// Adapter over one MongoDB collection.
///
/// Batches are ordered `insert_many` calls: documents before a failing one
/// stay written unless the call runs inside a transaction.
#[derive(Debug, Clone)]
pub struct MongoAdapter {
    collection: MongoCollection,
}

impl MongoAdapter {
    pub(crate) fn new(
        client: Client,
        inner: Collection<Document>,
        schema: &'static EntitySchema,
    ) -> Self {
        Self {
            collection: MongoCollection {
                client,
                name: inner.name().to_string(),
                inner,
                schema,
            },
        }
    }
}

#[async_trait]
impl StorageAdapter for MongoAdapter {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn name(&self) -> &str {
        &self.collection.name
    }

    fn schema(&self) -> &'static EntitySchema {
        self.collection.schema
    }

    async fn insert(&self, records: &[Record]) -> AppResult<()> {
        debug!(collection = %self.collection.name, count = records.len(), "Mongo insert");
        self.collection.insert(records, None).await
    }

    async fn replace(&self, records: &[Record]) -> AppResult<Vec<Uuid>> {
        debug!(collection = %self.collection.name, count = records.len(), "Mongo replace");
        self.collection.replace(records, None).await
    }

    async fn select(&self, query: &StoreQuery) -> AppResult<Vec<Record>> {
        self.collection.select(query, None).await
    }

    async fn count(&self, filter: Option<&Filter>) -> AppResult<u64> {
        self.collection.count(filter, None).await
    }

    async fn remove(&self, ids: &[Uuid]) -> AppResult<u64> {
        debug!(collection = %self.collection.name, count = ids.len(), "Mongo remove");
        self.collection.remove(ids, None).await
    }

    async fn update_fields(
        &self,
        filter: Option<&Filter>,
        updates: &FieldUpdates,
    ) -> AppResult<u64> {
        self.collection.update_fields(filter, updates, None).await
    }

    async fn begin(&self) -> AppResult<Arc<dyn AdapterTransaction>> {
        let mut session = self
            .collection
            .client
            .start_session()
            .await
            .map_err(|e| map_error(e, "Failed to start session"))?;
        session
            .start_transaction()
            .await
            .map_err(|e| map_error(e, "Failed to start transaction"))?;
        debug!(collection = %self.collection.name, "Mongo transaction started");
        Ok(Arc::new(MongoTransaction {
            collection: self.collection.clone(),
            session: Mutex::new(Some(session)),
        }))
    }
}

/// A multi-document transaction bound to one client session.
///
/// Requires a replica set or sharded cluster.
#[derive(Debug)]
pub struct MongoTransaction {
    collection: MongoCollection,
    session: Mutex<Option<ClientSession>>,
}

fn completed() -> AppError {
    AppError::transaction("Transaction already completed")
}

#[async_trait]
impl StorageAdapter for MongoTransaction {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn name(&self) -> &str {
        &self.collection.name
    }

    fn schema(&self) -> &'static EntitySchema {
        self.collection.schema
    }

    async fn insert(&self, records: &[Record]) -> AppResult<()> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or_else(completed)?;
        self.collection.insert(records, Some(session)).await
    }

    async fn replace(&self, records: &[Record]) -> AppResult<Vec<Uuid>> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or_else(completed)?;
        self.collection.replace(records, Some(session)).await
    }

    async fn select(&self, query: &StoreQuery) -> AppResult<Vec<Record>> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or_else(completed)?;
        self.collection.select(query, Some(session)).await
    }

    async fn count(&self, filter: Option<&Filter>) -> AppResult<u64> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or_else(completed)?;
        self.collection.count(filter, Some(session)).await
    }

    async fn remove(&self, ids: &[Uuid]) -> AppResult<u64> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or_else(completed)?;
        self.collection.remove(ids, Some(session)).await
    }

    async fn update_fields(
        &self,
        filter: Option<&Filter>,
        updates: &FieldUpdates,
    ) -> AppResult<u64> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or_else(completed)?;
        self.collection
            .update_fields(filter, updates, Some(session))
            .await
    }

    async fn begin(&self) -> AppResult<Arc<dyn AdapterTransaction>> {
        Err(AppError::not_supported(
            "Nested transactions are not supported by MongoDB",
        ))
    }
}

#[async_trait]
impl AdapterTransaction for MongoTransaction {
    async fn commit(&self) -> AppResult<()> {
        let mut session = self.session.lock().await.take().ok_or_else(completed)?;
        session
            .commit_transaction()
            .await
            .map_err(|e| map_error(e, "Failed to commit transaction"))?;
        debug!(collection = %self.collection.name, "Mongo transaction committed");
        Ok(())
    }

    async fn rollback(&self) -> AppResult<()> {
        let mut session = self.session.lock().await.take().ok_or_else(completed)?;
        session
            .abort_transaction()
            .await
            .map_err(|e| map_error(e, "Failed to abort transaction"))?;
        warn!(collection = %self.collection.name, "Mongo transaction rolled back");
        Ok(())
    }

    fn into_adapter(self: Arc<Self>) -> Arc<dyn StorageAdapter> {
        self
    }
}
