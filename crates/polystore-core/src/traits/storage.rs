//! Record-level storage primitives implemented once per engine.
//!
//! Adapters never see typed entities. The typed repository turns entities
//! into [`Record`]s, applies identifier, audit and soft-delete rules, and
//! calls these primitives. Filters and updates handed to an adapter have
//! already been normalized against the schema.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::entity::{EntitySchema, Record};
use crate::result::AppResult;
use crate::types::filter::Filter;
use crate::types::sorting::SortField;
use crate::types::update::FieldUpdates;

/// A select request: filter, ordering and window.
#[derive(Debug, Clone, Default)]
pub struct StoreQuery {
    /// Rows must match this filter; `None` selects every row.
    pub filter: Option<Filter>,
    /// Sort keys, primary first. Applied exactly as given.
    pub sort: Vec<SortField>,
    /// Rows to skip.
    pub skip: Option<u64>,
    /// Maximum number of rows to return.
    pub limit: Option<u64>,
}

impl StoreQuery {
    /// Select every row, unordered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to rows matching `filter`.
    pub fn filter(mut self, filter: Option<Filter>) -> Self {
        self.filter = filter;
        self
    }

    /// Order by `sort`.
    pub fn sort(mut self, sort: Vec<SortField>) -> Self {
        self.sort = sort;
        self
    }

    /// Skip `skip` rows and return at most `limit`.
    pub fn window(mut self, skip: u64, limit: u64) -> Self {
        self.skip = Some(skip);
        self.limit = Some(limit);
        self
    }
}

/// Access to one table or collection of a connected engine.
#[async_trait]
pub trait StorageAdapter: Send + Sync + fmt::Debug + 'static {
    /// Provider name of the owning backend.
    fn provider(&self) -> &str;

    /// Table / collection name after the naming convention was applied.
    fn name(&self) -> &str;

    /// Schema of the stored entity type.
    fn schema(&self) -> &'static EntitySchema;

    /// Most identifiers one `In` lookup may carry. Longer id lists are split.
    fn ids_per_lookup(&self) -> usize {
        usize::MAX
    }

    /// Insert new records. Fails with a conflict on a duplicate identifier.
    async fn insert(&self, records: &[Record]) -> AppResult<()>;

    /// Replace existing records by identifier; returns the ids that existed.
    async fn replace(&self, records: &[Record]) -> AppResult<Vec<Uuid>>;

    /// Select records.
    async fn select(&self, query: &StoreQuery) -> AppResult<Vec<Record>>;

    /// Count records matching `filter`.
    async fn count(&self, filter: Option<&Filter>) -> AppResult<u64>;

    /// Remove records by identifier; returns the number removed.
    async fn remove(&self, ids: &[Uuid]) -> AppResult<u64>;

    /// Apply `updates` to every record matching `filter`; returns the number
    /// of records changed.
    async fn update_fields(&self, filter: Option<&Filter>, updates: &FieldUpdates)
    -> AppResult<u64>;

    /// Start a transaction scoped to this table / collection.
    async fn begin(&self) -> AppResult<Arc<dyn AdapterTransaction>>;
}

/// A [`StorageAdapter`] whose writes stay pending until committed.
#[async_trait]
pub trait AdapterTransaction: StorageAdapter {
    /// Make every write of the transaction durable.
    async fn commit(&self) -> AppResult<()>;

    /// Discard every write of the transaction.
    async fn rollback(&self) -> AppResult<()>;

    /// View the transaction as a plain adapter.
    fn into_adapter(self: Arc<Self>) -> Arc<dyn StorageAdapter>;
}

/// A connected storage engine.
#[async_trait]
pub trait StorageBackend: Send + Sync + fmt::Debug + 'static {
    /// Provider name (e.g. `"SQLite"`).
    fn provider(&self) -> &str;

    /// Open the table / collection for `schema`, creating it and its
    /// identifier index on first use.
    async fn collection(&self, schema: &'static EntitySchema) -> AppResult<Arc<dyn StorageAdapter>>;

    /// Check that the engine is reachable.
    async fn health_check(&self) -> AppResult<bool>;

    /// Release every connection held by the backend.
    async fn close(&self) -> AppResult<()>;
}
