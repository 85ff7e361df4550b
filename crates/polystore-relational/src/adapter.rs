//! The shared relational adapter and its transaction-scoped twin.

use std::fmt;
use std::slice;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use polystore_core::entity::{ColumnType, EntitySchema, Record, record_id};
use polystore_core::error::AppError;
use polystore_core::result::AppResult;
use polystore_core::traits::storage::{AdapterTransaction, StorageAdapter, StoreQuery};
use polystore_core::types::filter::Filter;
use polystore_core::types::update::FieldUpdates;

use crate::context::{SqlContext, SqlExecutor, SqlSession};
use crate::statement::SqlTable;
use crate::value::row_record;

/// Adapter over one table of a relational engine.
#[derive(Debug, Clone)]
pub struct SqlAdapter {
    table: Arc<SqlTable>,
    context: Arc<dyn SqlContext>,
    bulk_threshold: usize,
}

impl SqlAdapter {
    /// Wrap a table whose DDL has already been applied.
    pub fn new(table: SqlTable, context: Arc<dyn SqlContext>, bulk_threshold: usize) -> Self {
        Self {
            table: Arc::new(table),
            context,
            bulk_threshold,
        }
    }

    /// Statement factory for the table.
    pub fn table(&self) -> &SqlTable {
        &self.table
    }
}

/// Commit on success, roll back and return the original error otherwise.
async fn settle<T>(session: Box<dyn SqlSession>, result: AppResult<T>) -> AppResult<T> {
    match result {
        Ok(value) => {
            session.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = session.rollback().await {
                warn!(error = %rollback, "Rollback after failed batch also failed");
            }
            Err(e)
        }
    }
}

#[async_trait]
impl StorageAdapter for SqlAdapter {
    fn provider(&self) -> &str {
        self.context.provider()
    }

    fn name(&self) -> &str {
        self.table.name()
    }

    fn schema(&self) -> &'static EntitySchema {
        self.table.schema()
    }

    fn ids_per_lookup(&self) -> usize {
        self.table.ids_per_statement()
    }

    async fn insert(&self, records: &[Record]) -> AppResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut session = self.context.begin().await?;
        let result = insert_rows(&self.table, session.executor(), records, self.bulk_threshold).await;
        settle(session, result).await
    }

    async fn replace(&self, records: &[Record]) -> AppResult<Vec<Uuid>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let mut session = self.context.begin().await?;
        let result = replace_rows(&self.table, session.executor(), records).await;
        settle(session, result).await
    }

    async fn select(&self, query: &StoreQuery) -> AppResult<Vec<Record>> {
        let mut conn = self.context.acquire().await?;
        select_rows(&self.table, conn.as_mut(), query).await
    }

    async fn count(&self, filter: Option<&Filter>) -> AppResult<u64> {
        let mut conn = self.context.acquire().await?;
        count_rows(&self.table, conn.as_mut(), filter).await
    }

    async fn remove(&self, ids: &[Uuid]) -> AppResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut session = self.context.begin().await?;
        let result = remove_rows(&self.table, session.executor(), ids).await;
        settle(session, result).await
    }

    async fn update_fields(
        &self,
        filter: Option<&Filter>,
        updates: &FieldUpdates,
    ) -> AppResult<u64> {
        let mut conn = self.context.acquire().await?;
        update_rows(&self.table, conn.as_mut(), filter, updates).await
    }

    async fn begin(&self) -> AppResult<Arc<dyn AdapterTransaction>> {
        let session = self.context.begin().await?;
        Ok(Arc::new(SqlTransactionAdapter {
            table: self.table.clone(),
            provider: self.context.provider(),
            bulk_threshold: self.bulk_threshold,
            session: Mutex::new(Some(session)),
        }))
    }
}

/// A relational adapter bound to one open transaction.
///
/// The transaction holds a connection until it is committed or rolled
/// back. With a single-connection context, other adapters block meanwhile.
pub struct SqlTransactionAdapter {
    table: Arc<SqlTable>,
    provider: &'static str,
    bulk_threshold: usize,
    session: Mutex<Option<Box<dyn SqlSession>>>,
}

impl fmt::Debug for SqlTransactionAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlTransactionAdapter")
            .field("table", &self.table.name())
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

fn completed() -> AppError {
    AppError::transaction("Transaction already completed")
}

#[async_trait]
impl StorageAdapter for SqlTransactionAdapter {
    fn provider(&self) -> &str {
        self.provider
    }

    fn name(&self) -> &str {
        self.table.name()
    }

    fn schema(&self) -> &'static EntitySchema {
        self.table.schema()
    }

    fn ids_per_lookup(&self) -> usize {
        self.table.ids_per_statement()
    }

    async fn insert(&self, records: &[Record]) -> AppResult<()> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or_else(completed)?;
        insert_rows(&self.table, session.executor(), records, self.bulk_threshold).await
    }

    async fn replace(&self, records: &[Record]) -> AppResult<Vec<Uuid>> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or_else(completed)?;
        replace_rows(&self.table, session.executor(), records).await
    }

    async fn select(&self, query: &StoreQuery) -> AppResult<Vec<Record>> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or_else(completed)?;
        select_rows(&self.table, session.executor(), query).await
    }

    async fn count(&self, filter: Option<&Filter>) -> AppResult<u64> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or_else(completed)?;
        count_rows(&self.table, session.executor(), filter).await
    }

    async fn remove(&self, ids: &[Uuid]) -> AppResult<u64> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or_else(completed)?;
        remove_rows(&self.table, session.executor(), ids).await
    }

    async fn update_fields(
        &self,
        filter: Option<&Filter>,
        updates: &FieldUpdates,
    ) -> AppResult<u64> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or_else(completed)?;
        update_rows(&self.table, session.executor(), filter, updates).await
    }

    async fn begin(&self) -> AppResult<Arc<dyn AdapterTransaction>> {
        Err(AppError::not_supported(format!(
            "Nested transactions are not supported by {}",
            self.provider
        )))
    }
}

#[async_trait]
impl AdapterTransaction for SqlTransactionAdapter {
    async fn commit(&self) -> AppResult<()> {
        let session = self.session.lock().await.take().ok_or_else(completed)?;
        session.commit().await?;
        debug!(table = self.table.name(), provider = self.provider, "Transaction committed");
        Ok(())
    }

    async fn rollback(&self) -> AppResult<()> {
        let session = self.session.lock().await.take().ok_or_else(completed)?;
        session.rollback().await?;
        warn!(table = self.table.name(), provider = self.provider, "Transaction rolled back");
        Ok(())
    }

    fn into_adapter(self: Arc<Self>) -> Arc<dyn StorageAdapter> {
        self
    }
}

/// Insert row by row up to `bulk_threshold`, in multi-row chunks above it.
async fn insert_rows(
    table: &SqlTable,
    exec: &mut dyn SqlExecutor,
    records: &[Record],
    bulk_threshold: usize,
) -> AppResult<()> {
    if records.len() <= bulk_threshold {
        for record in records {
            exec.execute(&table.insert(slice::from_ref(record))?).await?;
        }
        debug!(table = table.name(), count = records.len(), "Inserted rows");
    } else {
        let chunk_size = table.rows_per_insert();
        for chunk in records.chunks(chunk_size) {
            exec.execute(&table.insert(chunk)?).await?;
        }
        debug!(
            table = table.name(),
            count = records.len(),
            chunk_size,
            "Bulk inserted rows"
        );
    }
    Ok(())
}

async fn replace_rows(
    table: &SqlTable,
    exec: &mut dyn SqlExecutor,
    records: &[Record],
) -> AppResult<Vec<Uuid>> {
    let mut replaced = Vec::with_capacity(records.len());
    for record in records {
        let id = record_id(record)?;
        if exec.execute(&table.replace(id, record)?).await? > 0 {
            replaced.push(id);
        }
    }
    debug!(table = table.name(), count = replaced.len(), "Replaced rows");
    Ok(replaced)
}

async fn select_rows(
    table: &SqlTable,
    exec: &mut dyn SqlExecutor,
    query: &StoreQuery,
) -> AppResult<Vec<Record>> {
    let statement = table.select(query)?;
    let types: Vec<ColumnType> = table.columns().iter().map(|c| c.column_type).collect();
    let rows = exec.fetch(&statement, &types).await?;
    debug!(table = table.name(), rows = rows.len(), "Selected rows");
    rows.into_iter()
        .map(|row| row_record(table.columns(), row))
        .collect()
}

async fn count_rows(
    table: &SqlTable,
    exec: &mut dyn SqlExecutor,
    filter: Option<&Filter>,
) -> AppResult<u64> {
    exec.fetch_count(&table.count(filter)?).await
}

async fn remove_rows(
    table: &SqlTable,
    exec: &mut dyn SqlExecutor,
    ids: &[Uuid],
) -> AppResult<u64> {
    let mut removed = 0;
    for chunk in ids.chunks(table.ids_per_statement()) {
        removed += exec.execute(&table.delete(chunk)).await?;
    }
    debug!(table = table.name(), count = removed, "Removed rows");
    Ok(removed)
}

async fn update_rows(
    table: &SqlTable,
    exec: &mut dyn SqlExecutor,
    filter: Option<&Filter>,
    updates: &FieldUpdates,
) -> AppResult<u64> {
    if updates.is_empty() {
        return count_rows(table, exec, filter).await;
    }
    let updated = exec.execute(&table.update_fields(filter, updates)?).await?;
    debug!(table = table.name(), count = updated, "Updated rows");
    Ok(updated)
}
