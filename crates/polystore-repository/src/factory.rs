//! The repository handle callers hold.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use polystore_core::entity::Entity;
use polystore_core::error::AppError;
use polystore_core::result::AppResult;
use polystore_core::traits::repository::{
    EnhancedEntityRepository, EntityRepository, TransactionWork,
};
use polystore_core::traits::storage::StorageAdapter;
use polystore_core::types::audit::AuditContext;
use polystore_core::types::filter::Filter;
use polystore_core::types::pagination::{PageRequest, PagedResult};
use polystore_core::types::query::QueryParameters;
use polystore_core::types::sorting::SortField;
use polystore_core::types::update::FieldUpdates;

use crate::adapter_repository::AdapterRepository;

/// Repository for `T` on the configured provider.
///
/// Delegates every operation to the provider-specific repository chosen at
/// construction. With a cancellation token attached, an operation started
/// after cancellation fails immediately and one in flight is abandoned with a
/// cancellation error.
pub struct RepositoryFactory<T: Entity> {
    /// The selected repository.
    inner: Arc<dyn EnhancedEntityRepository<T>>,
    cancel: Option<CancellationToken>,
}

impl<T: Entity> Clone for RepositoryFactory<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<T: Entity> fmt::Debug for RepositoryFactory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryFactory")
            .field("entity", &T::schema().name())
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

impl<T: Entity> RepositoryFactory<T> {
    /// Build the repository over an adapter.
    pub fn new(adapter: Arc<dyn StorageAdapter>) -> Self {
        Self::from_repository(Arc::new(AdapterRepository::<T>::new(adapter)))
    }

    /// Wrap an existing repository (for testing).
    pub fn from_repository(repository: Arc<dyn EnhancedEntityRepository<T>>) -> Self {
        Self {
            inner: repository,
            cancel: None,
        }
    }

    /// A copy of this handle observing `token`.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            inner: self.inner.clone(),
            cancel: Some(token),
        }
    }

    /// Get a reference to the inner repository.
    pub fn repository(&self) -> &dyn EnhancedEntityRepository<T> {
        self.inner.as_ref()
    }

    async fn guard<R>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = AppResult<R>>,
    ) -> AppResult<R> {
        let Some(token) = &self.cancel else {
            return fut.await;
        };
        if token.is_cancelled() {
            return Err(cancelled::<T>(operation));
        }
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(entity = T::schema().name(), operation, "Operation cancelled in flight");
                Err(cancelled::<T>(operation))
            }
            result = fut => result,
        }
    }
}

fn cancelled<T: Entity>(operation: &str) -> AppError {
    AppError::cancelled(format!(
        "{operation} on '{}' was cancelled",
        T::schema().name()
    ))
}

#[async_trait]
impl<T: Entity> EntityRepository<T> for RepositoryFactory<T> {
    async fn create(&self, entity: T, ctx: &AuditContext) -> AppResult<T> {
        self.guard("create", self.inner.create(entity, ctx)).await
    }

    async fn create_many(&self, entities: Vec<T>, ctx: &AuditContext) -> AppResult<Vec<T>> {
        self.guard("create_many", self.inner.create_many(entities, ctx))
            .await
    }

    async fn update(&self, entity: T, ctx: &AuditContext) -> AppResult<Option<T>> {
        self.guard("update", self.inner.update(entity, ctx)).await
    }

    async fn update_many(&self, entities: Vec<T>, ctx: &AuditContext) -> AppResult<Vec<T>> {
        self.guard("update_many", self.inner.update_many(entities, ctx))
            .await
    }

    async fn delete(&self, id: Uuid) -> AppResult<Option<T>> {
        self.guard("delete", self.inner.delete(id)).await
    }

    async fn delete_many(&self, ids: &[Uuid]) -> AppResult<Vec<T>> {
        self.guard("delete_many", self.inner.delete_many(ids)).await
    }

    async fn get_all(&self) -> AppResult<Vec<T>> {
        self.guard("get_all", self.inner.get_all()).await
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<T>> {
        self.guard("get_by_id", self.inner.get_by_id(id)).await
    }

    async fn get_by_ids(&self, ids: &[Uuid]) -> AppResult<Vec<T>> {
        self.guard("get_by_ids", self.inner.get_by_ids(ids)).await
    }

    async fn find(&self, filter: Filter) -> AppResult<Vec<T>> {
        self.guard("find", self.inner.find(filter)).await
    }

    async fn find_one(&self, filter: Filter) -> AppResult<Option<T>> {
        self.guard("find_one", self.inner.find_one(filter)).await
    }

    async fn exists(&self, filter: Filter) -> AppResult<bool> {
        self.guard("exists", self.inner.exists(filter)).await
    }

    async fn get_paged(&self, page: PageRequest) -> AppResult<PagedResult<T>> {
        self.guard("get_paged", self.inner.get_paged(page)).await
    }

    async fn find_paged(&self, filter: Filter, page: PageRequest) -> AppResult<PagedResult<T>> {
        self.guard("find_paged", self.inner.find_paged(filter, page))
            .await
    }

    async fn count(&self) -> AppResult<u64> {
        self.guard("count", self.inner.count()).await
    }

    async fn count_matching(&self, filter: Filter) -> AppResult<u64> {
        self.guard("count_matching", self.inner.count_matching(filter))
            .await
    }
}

#[async_trait]
impl<T: Entity> EnhancedEntityRepository<T> for RepositoryFactory<T> {
    async fn get_all_sorted(&self, sort: Vec<SortField>) -> AppResult<Vec<T>> {
        self.guard("get_all_sorted", self.inner.get_all_sorted(sort))
            .await
    }

    async fn find_sorted(&self, filter: Filter, sort: Vec<SortField>) -> AppResult<Vec<T>> {
        self.guard("find_sorted", self.inner.find_sorted(filter, sort))
            .await
    }

    async fn get_paged_sorted(
        &self,
        sort: Vec<SortField>,
        page: PageRequest,
    ) -> AppResult<PagedResult<T>> {
        self.guard("get_paged_sorted", self.inner.get_paged_sorted(sort, page))
            .await
    }

    async fn find_paged_sorted(
        &self,
        filter: Filter,
        sort: Vec<SortField>,
        page: PageRequest,
    ) -> AppResult<PagedResult<T>> {
        self.guard(
            "find_paged_sorted",
            self.inner.find_paged_sorted(filter, sort, page),
        )
        .await
    }

    async fn query(&self, params: QueryParameters) -> AppResult<PagedResult<T>> {
        self.guard("query", self.inner.query(params)).await
    }

    async fn soft_delete(&self, id: Uuid, ctx: &AuditContext) -> AppResult<Option<T>> {
        self.guard("soft_delete", self.inner.soft_delete(id, ctx))
            .await
    }

    async fn restore(&self, id: Uuid) -> AppResult<Option<T>> {
        self.guard("restore", self.inner.restore(id)).await
    }

    async fn get_all_include_deleted(&self) -> AppResult<Vec<T>> {
        self.guard(
            "get_all_include_deleted",
            self.inner.get_all_include_deleted(),
        )
        .await
    }

    async fn update_many_with_fields(
        &self,
        filter: Filter,
        updates: FieldUpdates,
        ctx: &AuditContext,
    ) -> AppResult<u64> {
        self.guard(
            "update_many_with_fields",
            self.inner.update_many_with_fields(filter, updates, ctx),
        )
        .await
    }

    async fn execute_in_transaction(&self, work: TransactionWork<T>) -> AppResult<bool> {
        self.guard(
            "execute_in_transaction",
            self.inner.execute_in_transaction(work),
        )
        .await
    }
}
