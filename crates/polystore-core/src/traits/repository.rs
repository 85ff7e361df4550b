//! Repository contracts every provider satisfies.
//!
//! Both traits are object safe, so callers can hold an
//! `Arc<dyn EnhancedEntityRepository<T>>` and stay unaware of the engine.

use async_trait::async_trait;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::entity::Entity;
use crate::result::AppResult;
use crate::types::audit::AuditContext;
use crate::types::filter::Filter;
use crate::types::pagination::{PageRequest, PagedResult};
use crate::types::query::QueryParameters;
use crate::types::sorting::SortField;
use crate::types::update::FieldUpdates;

/// Unit of work run by [`EnhancedEntityRepository::execute_in_transaction`].
///
/// Returning `Ok(true)` commits, `Ok(false)` rolls back, and an error rolls
/// back and is handed back to the caller.
pub type TransactionWork<T> = Box<
    dyn for<'r> FnOnce(&'r dyn EnhancedEntityRepository<T>) -> BoxFuture<'r, AppResult<bool>>
        + Send,
>;

/// Box a closure as [`TransactionWork`].
///
/// ```ignore
/// repo.execute_in_transaction(transaction_work(move |tx| {
///     Box::pin(async move {
///         tx.create(page, &ctx).await?;
///         Ok(true)
///     })
/// }))
/// .await?;
/// ```
pub fn transaction_work<T, F>(work: F) -> TransactionWork<T>
where
    T: Entity,
    F: for<'r> FnOnce(&'r dyn EnhancedEntityRepository<T>) -> BoxFuture<'r, AppResult<bool>>
        + Send
        + 'static,
{
    Box::new(work)
}

/// Base repository contract.
///
/// Default read paths hide soft-deleted entities. Nil identifiers and
/// invalid pages are rejected with a validation error before the engine is
/// touched.
#[async_trait]
pub trait EntityRepository<T: Entity>: Send + Sync {
    /// Persist a new entity, assigning an id when it is nil.
    async fn create(&self, entity: T, ctx: &AuditContext) -> AppResult<T>;

    /// Persist several new entities as one batch.
    async fn create_many(&self, entities: Vec<T>, ctx: &AuditContext) -> AppResult<Vec<T>>;

    /// Replace an existing entity. `None` when no visible entity has its id.
    async fn update(&self, entity: T, ctx: &AuditContext) -> AppResult<Option<T>>;

    /// Replace several entities, silently skipping those that do not exist.
    async fn update_many(&self, entities: Vec<T>, ctx: &AuditContext) -> AppResult<Vec<T>>;

    /// Hard delete; returns the entity as it was before deletion.
    async fn delete(&self, id: Uuid) -> AppResult<Option<T>>;

    /// Hard delete several entities; returns the subset that was removed.
    async fn delete_many(&self, ids: &[Uuid]) -> AppResult<Vec<T>>;

    /// Every visible entity.
    async fn get_all(&self) -> AppResult<Vec<T>>;

    /// A visible entity by id.
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<T>>;

    /// The visible entities among `ids`; missing ids are skipped.
    async fn get_by_ids(&self, ids: &[Uuid]) -> AppResult<Vec<T>>;

    /// Visible entities matching `filter`.
    async fn find(&self, filter: Filter) -> AppResult<Vec<T>>;

    /// First visible entity matching `filter` in id order.
    async fn find_one(&self, filter: Filter) -> AppResult<Option<T>>;

    /// Whether any visible entity matches `filter`.
    async fn exists(&self, filter: Filter) -> AppResult<bool>;

    /// One page of visible entities in id order.
    async fn get_paged(&self, page: PageRequest) -> AppResult<PagedResult<T>>;

    /// One page of visible entities matching `filter`, in id order.
    async fn find_paged(&self, filter: Filter, page: PageRequest) -> AppResult<PagedResult<T>>;

    /// Number of visible entities.
    async fn count(&self) -> AppResult<u64>;

    /// Number of visible entities matching `filter`.
    async fn count_matching(&self, filter: Filter) -> AppResult<u64>;
}

/// Extended contract: sorting, soft delete, partial updates, transactions.
#[async_trait]
pub trait EnhancedEntityRepository<T: Entity>: EntityRepository<T> {
    /// Every visible entity, sorted by `sort` in priority order.
    async fn get_all_sorted(&self, sort: Vec<SortField>) -> AppResult<Vec<T>>;

    /// Visible entities matching `filter`, sorted.
    async fn find_sorted(&self, filter: Filter, sort: Vec<SortField>) -> AppResult<Vec<T>>;

    /// One sorted page of visible entities.
    async fn get_paged_sorted(
        &self,
        sort: Vec<SortField>,
        page: PageRequest,
    ) -> AppResult<PagedResult<T>>;

    /// One sorted page of visible entities matching `filter`.
    async fn find_paged_sorted(
        &self,
        filter: Filter,
        sort: Vec<SortField>,
        page: PageRequest,
    ) -> AppResult<PagedResult<T>>;

    /// Run a combined filter / sort / page query.
    async fn query(&self, params: QueryParameters) -> AppResult<PagedResult<T>>;

    /// Flag an entity as deleted. `None` when `T` is not soft-deletable or
    /// no visible entity has the id.
    async fn soft_delete(&self, id: Uuid, ctx: &AuditContext) -> AppResult<Option<T>>;

    /// Clear the deletion flag. `None` when `T` is not soft-deletable or the
    /// id does not exist.
    async fn restore(&self, id: Uuid) -> AppResult<Option<T>>;

    /// Every entity, soft-deleted or not.
    async fn get_all_include_deleted(&self) -> AppResult<Vec<T>>;

    /// Apply `updates` to every visible entity matching `filter`; returns the
    /// number of entities changed.
    async fn update_many_with_fields(
        &self,
        filter: Filter,
        updates: FieldUpdates,
        ctx: &AuditContext,
    ) -> AppResult<u64>;

    /// Run `work` against a transaction-scoped repository.
    async fn execute_in_transaction(&self, work: TransactionWork<T>) -> AppResult<bool>;
}
