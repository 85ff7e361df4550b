//! The typed repository shared by every engine.
//!
//! Adapters only move records. Everything callers can observe beyond raw
//! storage lives here: identifier assignment, audit stamping, soft-delete
//! visibility, parameter validation, the `id` tiebreaker on every ordered
//! read, and paging totals. Running the same code on every engine is what
//! makes results identical across providers.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use polystore_core::entity::{Entity, EntitySchema, Record, fields, from_record, to_record};
use polystore_core::error::AppError;
use polystore_core::result::AppResult;
use polystore_core::traits::repository::{
    EnhancedEntityRepository, EntityRepository, TransactionWork,
};
use polystore_core::traits::storage::{StorageAdapter, StoreQuery};
use polystore_core::types::audit::AuditContext;
use polystore_core::types::filter::{Filter, format_timestamp};
use polystore_core::types::pagination::{PageRequest, PagedResult};
use polystore_core::types::query::QueryParameters;
use polystore_core::types::sorting::{SortField, require_sort, validate_sort};
use polystore_core::types::update::FieldUpdates;

/// Typed repository over a [`StorageAdapter`].
pub struct AdapterRepository<T: Entity> {
    adapter: Arc<dyn StorageAdapter>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Clone for AdapterRepository<T> {
    fn clone(&self) -> Self {
        Self::new(self.adapter.clone())
    }
}

impl<T: Entity> fmt::Debug for AdapterRepository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRepository")
            .field("entity", &T::schema().name())
            .field("adapter", &self.adapter)
            .finish()
    }
}

impl<T: Entity> AdapterRepository<T> {
    /// Wrap the adapter holding `T`'s table or collection.
    pub fn new(adapter: Arc<dyn StorageAdapter>) -> Self {
        Self {
            adapter,
            _entity: PhantomData,
        }
    }

    /// The underlying adapter.
    pub fn adapter(&self) -> &Arc<dyn StorageAdapter> {
        &self.adapter
    }

    fn schema(&self) -> &'static EntitySchema {
        T::schema()
    }

    /// Normalize a caller filter and hide soft-deleted rows.
    fn visible(&self, filter: Option<Filter>) -> AppResult<Option<Filter>> {
        let filter = filter.map(|f| f.normalize(self.schema())).transpose()?;
        if !self.schema().is_soft_deletable() {
            return Ok(filter);
        }
        let live = Filter::eq(fields::IS_DELETED, false);
        Ok(Some(match filter {
            Some(filter) => filter.and(live),
            None => live,
        }))
    }

    /// Normalize a caller filter without the soft-delete restriction.
    fn any_state(&self, filter: Filter) -> AppResult<Option<Filter>> {
        filter.normalize(self.schema()).map(Some)
    }

    async fn load(&self, query: StoreQuery) -> AppResult<Vec<T>> {
        self.adapter
            .select(&query)
            .await?
            .into_iter()
            .map(from_record::<T>)
            .collect()
    }

    async fn load_page(
        &self,
        filter: Option<Filter>,
        sort: Vec<SortField>,
        page: PageRequest,
    ) -> AppResult<PagedResult<T>> {
        page.validate()?;
        let total = self.adapter.count(filter.as_ref()).await?;
        let items = self
            .load(
                StoreQuery::new()
                    .filter(filter)
                    .sort(with_tiebreak(sort))
                    .window(page.offset(), page.limit()),
            )
            .await?;
        debug!(
            entity = self.schema().name(),
            page = page.page,
            page_size = page.page_size,
            total,
            "Loaded page"
        );
        Ok(PagedResult::new(items, total, &page))
    }

    async fn first(&self, filter: Option<Filter>) -> AppResult<Option<T>> {
        let query = StoreQuery::new()
            .filter(filter)
            .sort(with_tiebreak(Vec::new()))
            .window(0, 1);
        Ok(self.load(query).await?.into_iter().next())
    }

    async fn visible_by_id(&self, id: Uuid) -> AppResult<Option<T>> {
        self.first(self.visible(Some(Filter::eq(fields::ID, id)))?)
            .await
    }

    async fn any_by_id(&self, id: Uuid) -> AppResult<Option<T>> {
        self.first(self.any_state(Filter::eq(fields::ID, id))?).await
    }

    /// Load the entities with `ids`, in id order, splitting the list to fit
    /// the adapter's lookup limit.
    async fn load_ids(&self, ids: &[Uuid], include_deleted: bool) -> AppResult<Vec<T>> {
        let per_lookup = self.adapter.ids_per_lookup().max(1);
        let mut loaded = Vec::new();
        for chunk in ids.chunks(per_lookup) {
            let lookup = Filter::in_list(fields::ID, chunk.to_vec());
            let filter = if include_deleted {
                self.any_state(lookup)?
            } else {
                self.visible(Some(lookup))?
            };
            loaded.extend(self.load(StoreQuery::new().filter(filter)).await?);
        }
        loaded.sort_by_key(|entity| entity.id());
        if ids.len() > per_lookup {
            debug!(
                entity = self.schema().name(),
                ids = ids.len(),
                per_lookup,
                found = loaded.len(),
                "Loaded entities by id in chunks"
            );
        }
        Ok(loaded)
    }

    async fn replace_one(&self, entity: T) -> AppResult<Option<T>> {
        let record = to_record(&entity)?;
        let replaced = self.adapter.replace(&[record]).await?;
        Ok((!replaced.is_empty()).then_some(entity))
    }

    /// Assign an id and creation stamps to a new entity.
    fn prepare_new(&self, mut entity: T, ctx: &AuditContext, now: DateTime<Utc>) -> T {
        if entity.id().is_nil() {
            entity.set_id(Uuid::new_v4());
        }
        if let Some(auditable) = entity.as_auditable_mut() {
            let stamp = auditable.audit_mut();
            stamp.created_date = Some(now);
            stamp.created_by = Some(ctx.actor.clone());
            stamp.last_modified_date = None;
            stamp.last_modified_by = None;
        }
        entity
    }
}

/// Keep creation and deletion metadata from the stored entity and stamp the
/// modification.
fn merge_update<T: Entity>(stored: &T, entity: &mut T, ctx: &AuditContext, now: DateTime<Utc>) {
    if let (Some(old), Some(new)) = (stored.as_auditable(), entity.as_auditable_mut()) {
        let stamp = new.audit_mut();
        stamp.created_date = old.audit().created_date;
        stamp.created_by = old.audit().created_by.clone();
        stamp.last_modified_date = Some(now);
        stamp.last_modified_by = Some(ctx.actor.clone());
    }
    if let (Some(old), Some(new)) = (stored.as_soft_deletable(), entity.as_soft_deletable_mut()) {
        *new.deletion_mut() = old.deletion().clone();
    }
}

/// Append `id ASC` unless the caller already sorts by id.
fn with_tiebreak(mut sort: Vec<SortField>) -> Vec<SortField> {
    if !sort.iter().any(|key| key.field == fields::ID) {
        sort.push(SortField::asc(fields::ID));
    }
    sort
}

fn require_id(id: Uuid) -> AppResult<()> {
    if id.is_nil() {
        return Err(AppError::validation("Entity id must not be empty"));
    }
    Ok(())
}

fn require_ids(ids: &[Uuid]) -> AppResult<Vec<Uuid>> {
    let mut seen = HashSet::with_capacity(ids.len());
    let mut unique = Vec::with_capacity(ids.len());
    for id in ids {
        require_id(*id)?;
        if seen.insert(*id) {
            unique.push(*id);
        }
    }
    Ok(unique)
}

#[async_trait]
impl<T: Entity> EntityRepository<T> for AdapterRepository<T> {
    async fn create(&self, entity: T, ctx: &AuditContext) -> AppResult<T> {
        let entity = self.prepare_new(entity, ctx, Utc::now());
        self.adapter.insert(&[to_record(&entity)?]).await?;
        debug!(entity = self.schema().name(), id = %entity.id(), "Created entity");
        Ok(entity)
    }

    async fn create_many(&self, entities: Vec<T>, ctx: &AuditContext) -> AppResult<Vec<T>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }
        let now = Utc::now();
        let entities: Vec<T> = entities
            .into_iter()
            .map(|e| self.prepare_new(e, ctx, now))
            .collect();
        let records = entities
            .iter()
            .map(to_record)
            .collect::<AppResult<Vec<Record>>>()?;
        self.adapter.insert(&records).await?;
        info!(
            entity = self.schema().name(),
            count = entities.len(),
            provider = self.adapter.provider(),
            "Created entities"
        );
        Ok(entities)
    }

    async fn update(&self, mut entity: T, ctx: &AuditContext) -> AppResult<Option<T>> {
        require_id(entity.id())?;
        let Some(stored) = self.visible_by_id(entity.id()).await? else {
            return Ok(None);
        };
        merge_update(&stored, &mut entity, ctx, Utc::now());
        let updated = self.replace_one(entity).await?;
        debug!(entity = self.schema().name(), found = updated.is_some(), "Updated entity");
        Ok(updated)
    }

    async fn update_many(&self, entities: Vec<T>, ctx: &AuditContext) -> AppResult<Vec<T>> {
        let ids: Vec<Uuid> = entities.iter().map(Entity::id).collect();
        let ids = require_ids(&ids)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let stored: HashMap<Uuid, T> = self
            .load_ids(&ids, false)
            .await?
            .into_iter()
            .map(|e| (e.id(), e))
            .collect();

        let now = Utc::now();
        let mut pending = Vec::with_capacity(stored.len());
        for mut entity in entities {
            if let Some(old) = stored.get(&entity.id()) {
                merge_update(old, &mut entity, ctx, now);
                pending.push(entity);
            }
        }
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let records = pending
            .iter()
            .map(to_record)
            .collect::<AppResult<Vec<Record>>>()?;
        let replaced: HashSet<Uuid> = self.adapter.replace(&records).await?.into_iter().collect();
        let updated: Vec<T> = pending
            .into_iter()
            .filter(|e| replaced.contains(&e.id()))
            .collect();
        debug!(entity = self.schema().name(), count = updated.len(), "Updated entities");
        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> AppResult<Option<T>> {
        require_id(id)?;
        let Some(existing) = self.any_by_id(id).await? else {
            return Ok(None);
        };
        let removed = self.adapter.remove(&[id]).await?;
        debug!(entity = self.schema().name(), %id, removed, "Deleted entity");
        Ok((removed > 0).then_some(existing))
    }

    async fn delete_many(&self, ids: &[Uuid]) -> AppResult<Vec<T>> {
        let ids = require_ids(ids)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let existing = self.load_ids(&ids, true).await?;
        if existing.is_empty() {
            return Ok(Vec::new());
        }
        let found: Vec<Uuid> = existing.iter().map(Entity::id).collect();
        let removed = self.adapter.remove(&found).await?;
        if removed != found.len() as u64 {
            warn!(
                entity = self.schema().name(),
                expected = found.len(),
                removed,
                "Some entities disappeared before they could be deleted"
            );
        }
        info!(entity = self.schema().name(), count = removed, "Deleted entities");
        Ok(existing)
    }

    async fn get_all(&self) -> AppResult<Vec<T>> {
        self.load(
            StoreQuery::new()
                .filter(self.visible(None)?)
                .sort(with_tiebreak(Vec::new())),
        )
        .await
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<T>> {
        require_id(id)?;
        self.visible_by_id(id).await
    }

    async fn get_by_ids(&self, ids: &[Uuid]) -> AppResult<Vec<T>> {
        let ids = require_ids(ids)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.load_ids(&ids, false).await
    }

    async fn find(&self, filter: Filter) -> AppResult<Vec<T>> {
        self.load(
            StoreQuery::new()
                .filter(self.visible(Some(filter))?)
                .sort(with_tiebreak(Vec::new())),
        )
        .await
    }

    async fn find_one(&self, filter: Filter) -> AppResult<Option<T>> {
        self.first(self.visible(Some(filter))?).await
    }

    async fn exists(&self, filter: Filter) -> AppResult<bool> {
        Ok(self.find_one(filter).await?.is_some())
    }

    async fn get_paged(&self, page: PageRequest) -> AppResult<PagedResult<T>> {
        self.load_page(self.visible(None)?, Vec::new(), page).await
    }

    async fn find_paged(&self, filter: Filter, page: PageRequest) -> AppResult<PagedResult<T>> {
        self.load_page(self.visible(Some(filter))?, Vec::new(), page)
            .await
    }

    async fn count(&self) -> AppResult<u64> {
        self.adapter.count(self.visible(None)?.as_ref()).await
    }

    async fn count_matching(&self, filter: Filter) -> AppResult<u64> {
        self.adapter
            .count(self.visible(Some(filter))?.as_ref())
            .await
    }
}

#[async_trait]
impl<T: Entity> EnhancedEntityRepository<T> for AdapterRepository<T> {
    async fn get_all_sorted(&self, sort: Vec<SortField>) -> AppResult<Vec<T>> {
        require_sort(&sort, self.schema())?;
        self.load(
            StoreQuery::new()
                .filter(self.visible(None)?)
                .sort(with_tiebreak(sort)),
        )
        .await
    }

    async fn find_sorted(&self, filter: Filter, sort: Vec<SortField>) -> AppResult<Vec<T>> {
        require_sort(&sort, self.schema())?;
        self.load(
            StoreQuery::new()
                .filter(self.visible(Some(filter))?)
                .sort(with_tiebreak(sort)),
        )
        .await
    }

    async fn get_paged_sorted(
        &self,
        sort: Vec<SortField>,
        page: PageRequest,
    ) -> AppResult<PagedResult<T>> {
        require_sort(&sort, self.schema())?;
        self.load_page(self.visible(None)?, sort, page).await
    }

    async fn find_paged_sorted(
        &self,
        filter: Filter,
        sort: Vec<SortField>,
        page: PageRequest,
    ) -> AppResult<PagedResult<T>> {
        require_sort(&sort, self.schema())?;
        self.load_page(self.visible(Some(filter))?, sort, page)
            .await
    }

    async fn query(&self, params: QueryParameters) -> AppResult<PagedResult<T>> {
        validate_sort(&params.sort, self.schema())?;
        self.load_page(self.visible(params.filter)?, params.sort, params.page)
            .await
    }

    async fn soft_delete(&self, id: Uuid, ctx: &AuditContext) -> AppResult<Option<T>> {
        require_id(id)?;
        if !self.schema().is_soft_deletable() {
            return Ok(None);
        }
        let Some(mut entity) = self.visible_by_id(id).await? else {
            return Ok(None);
        };
        let Some(deletable) = entity.as_soft_deletable_mut() else {
            return Ok(None);
        };
        deletable.deletion_mut().mark_deleted(&ctx.actor, Utc::now());
        let deleted = self.replace_one(entity).await?;
        debug!(entity = self.schema().name(), %id, actor = %ctx.actor, "Soft-deleted entity");
        Ok(deleted)
    }

    async fn restore(&self, id: Uuid) -> AppResult<Option<T>> {
        require_id(id)?;
        if !self.schema().is_soft_deletable() {
            return Ok(None);
        }
        let Some(mut entity) = self.any_by_id(id).await? else {
            return Ok(None);
        };
        let Some(deletable) = entity.as_soft_deletable_mut() else {
            return Ok(None);
        };
        deletable.deletion_mut().clear();
        let restored = self.replace_one(entity).await?;
        debug!(entity = self.schema().name(), %id, "Restored entity");
        Ok(restored)
    }

    async fn get_all_include_deleted(&self) -> AppResult<Vec<T>> {
        self.load(StoreQuery::new().sort(with_tiebreak(Vec::new())))
            .await
    }

    async fn update_many_with_fields(
        &self,
        filter: Filter,
        updates: FieldUpdates,
        ctx: &AuditContext,
    ) -> AppResult<u64> {
        if updates.is_empty() {
            return Ok(0);
        }
        let updates = if self.schema().is_auditable() {
            updates
                .set(fields::LAST_MODIFIED_DATE, format_timestamp(&Utc::now()))
                .set(fields::LAST_MODIFIED_BY, ctx.actor.clone())
        } else {
            updates
        };
        let updates = updates.normalize(self.schema())?;
        let filter = self.visible(Some(filter))?;
        let changed = self.adapter.update_fields(filter.as_ref(), &updates).await?;
        info!(
            entity = self.schema().name(),
            changed,
            actor = %ctx.actor,
            "Applied field updates"
        );
        Ok(changed)
    }

    async fn execute_in_transaction(&self, work: TransactionWork<T>) -> AppResult<bool> {
        let tx = self.adapter.begin().await?;
        let scoped = AdapterRepository::<T>::new(tx.clone().into_adapter());

        match work(&scoped).await {
            Ok(true) => {
                tx.commit().await?;
                info!(entity = self.schema().name(), "Transaction committed");
                Ok(true)
            }
            Ok(false) => {
                tx.rollback().await?;
                Ok(false)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(
                        entity = self.schema().name(),
                        error = %rollback,
                        "Rollback after failed transaction work also failed"
                    );
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::LazyLock;

    use serde::{Deserialize, Serialize};

    use polystore_core::config::naming::NamingOptions;
    use polystore_core::entity::{
        AuditStamp, Auditable, ColumnType, SoftDeletable, SoftDeleteStamp,
    };
    use polystore_core::error::ErrorKind;
    use polystore_core::traits::repository::transaction_work;
    use polystore_core::traits::storage::StorageBackend;
    use polystore_document::{EmbeddedBackend, EmbeddedDatabase};

    use super::*;

    static ARTICLE: LazyLock<EntitySchema> = LazyLock::new(|| {
        EntitySchema::builder("Article")
            .column("title", ColumnType::Text)
            .nullable("views", ColumnType::Integer)
            .auditable()
            .soft_deletable()
            .build()
    });

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub(crate) struct Article {
        pub id: Uuid,
        pub title: String,
        pub views: Option<i64>,
        #[serde(flatten)]
        pub audit: AuditStamp,
        #[serde(flatten)]
        pub deletion: SoftDeleteStamp,
    }

    impl Article {
        pub(crate) fn new(title: &str, views: Option<i64>) -> Self {
            Self {
                id: Uuid::nil(),
                title: title.to_string(),
                views,
                audit: AuditStamp::default(),
                deletion: SoftDeleteStamp::default(),
            }
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

    pub(crate) async fn repo() -> AdapterRepository<Article> {
        let backend = EmbeddedBackend::new(EmbeddedDatabase::in_memory(), NamingOptions::default());
        AdapterRepository::new(backend.collection(Article::schema()).await.unwrap())
    }

    fn editor() -> AuditContext {
        AuditContext::new("editor")
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_stamps() {
        let repo = repo().await;
        let created = repo.create(Article::new("a", None), &editor()).await.unwrap();
        assert!(!created.id.is_nil());
        assert_eq!(created.audit.created_by.as_deref(), Some("editor"));
        assert!(created.audit.created_date.is_some());
        assert!(created.audit.last_modified_date.is_none());

        let loaded = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(loaded, created);
    }

    #[tokio::test]
    async fn test_create_keeps_caller_id() {
        let repo = repo().await;
        let mut article = Article::new("a", None);
        let id = Uuid::new_v4();
        article.id = id;
        assert_eq!(repo.create(article, &editor()).await.unwrap().id, id);
    }

    #[tokio::test]
    async fn test_update_preserves_creation_and_stamps_modification() {
        let repo = repo().await;
        let created = repo.create(Article::new("a", None), &editor()).await.unwrap();

        let mut changed = created.clone();
        changed.title = "b".to_string();
        changed.audit = AuditStamp::default();
        let updated = repo
            .update(changed, &AuditContext::new("reviewer"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.audit.created_date, created.audit.created_date);
        assert_eq!(updated.audit.created_by.as_deref(), Some("editor"));
        assert_eq!(updated.audit.last_modified_by.as_deref(), Some("reviewer"));
        assert!(updated.audit.last_modified_date.is_some());
    }

    #[tokio::test]
    async fn test_update_missing_returns_none_and_nil_id_is_rejected() {
        let repo = repo().await;
        let mut ghost = Article::new("ghost", None);
        ghost.id = Uuid::new_v4();
        assert!(repo.update(ghost, &editor()).await.unwrap().is_none());

        let err = repo
            .update(Article::new("nil", None), &editor())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_update_many_skips_missing() {
        let repo = repo().await;
        let a = repo.create(Article::new("a", None), &editor()).await.unwrap();
        let mut ghost = Article::new("ghost", None);
        ghost.id = Uuid::new_v4();

        let updated = repo.update_many(vec![a.clone(), ghost], &editor()).await.unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].id, a.id);
    }

    #[tokio::test]
    async fn test_soft_delete_and_restore_visibility() {
        let repo = repo().await;
        let a = repo.create(Article::new("a", None), &editor()).await.unwrap();

        let deleted = repo.soft_delete(a.id, &editor()).await.unwrap().unwrap();
        assert!(deleted.deletion.is_deleted);
        assert_eq!(deleted.deletion.deleted_by.as_deref(), Some("editor"));
        assert!(repo.get_by_id(a.id).await.unwrap().is_none());
        assert_eq!(repo.count().await.unwrap(), 0);
        assert_eq!(repo.get_all_include_deleted().await.unwrap().len(), 1);
        assert!(repo.soft_delete(a.id, &editor()).await.unwrap().is_none());

        let restored = repo.restore(a.id).await.unwrap().unwrap();
        assert_eq!(restored.deletion, SoftDeleteStamp::default());
        assert!(repo.get_by_id(a.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_returns_prior_state_including_soft_deleted() {
        let repo = repo().await;
        let a = repo.create(Article::new("a", None), &editor()).await.unwrap();
        repo.soft_delete(a.id, &editor()).await.unwrap();

        let removed = repo.delete(a.id).await.unwrap().unwrap();
        assert!(removed.deletion.is_deleted);
        assert!(repo.delete(a.id).await.unwrap().is_none());
        assert!(repo.get_all_include_deleted().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_many_returns_found_subset() {
        let repo = repo().await;
        let a = repo.create(Article::new("a", None), &editor()).await.unwrap();
        let b = repo.create(Article::new("b", None), &editor()).await.unwrap();

        let removed = repo
            .delete_many(&[a.id, Uuid::new_v4(), a.id])
            .await
            .unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, a.id);
        assert_eq!(repo.get_all().await.unwrap(), vec![b]);
    }

    #[tokio::test]
    async fn test_pages_are_disjoint_and_counted() {
        let repo = repo().await;
        let batch = (0..7).map(|i| Article::new(&format!("a{i}"), Some(i % 3))).collect();
        repo.create_many(batch, &editor()).await.unwrap();

        let sort = vec![SortField::desc("views")];
        let first = repo
            .get_paged_sorted(sort.clone(), PageRequest::new(1, 3))
            .await
            .unwrap();
        let second = repo
            .get_paged_sorted(sort.clone(), PageRequest::new(2, 3))
            .await
            .unwrap();
        let third = repo
            .get_paged_sorted(sort, PageRequest::new(3, 3))
            .await
            .unwrap();

        assert_eq!(first.total_count, 7);
        assert_eq!(first.total_pages(), 3);
        assert_eq!(third.items.len(), 1);
        let mut ids: Vec<Uuid> = first
            .items
            .iter()
            .chain(&second.items)
            .chain(&third.items)
            .map(|a| a.id)
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 7);
        assert!(first.items.windows(2).all(|w| w[0].views >= w[1].views));
    }

    #[tokio::test]
    async fn test_validation_before_engine() {
        let repo = repo().await;
        assert!(repo.get_by_id(Uuid::nil()).await.unwrap_err().is_validation());
        assert!(repo.get_paged(PageRequest::new(0, 10)).await.unwrap_err().is_validation());
        assert!(repo.get_all_sorted(Vec::new()).await.unwrap_err().is_validation());
        assert!(
            repo.find(Filter::eq("missing", 1))
                .await
                .unwrap_err()
                .is_validation()
        );
    }

    #[tokio::test]
    async fn test_update_many_with_fields_stamps_audit() {
        let repo = repo().await;
        let batch = vec![Article::new("a", Some(1)), Article::new("b", Some(5))];
        repo.create_many(batch, &editor()).await.unwrap();

        let changed = repo
            .update_many_with_fields(
                Filter::gte("views", 2),
                FieldUpdates::new().set("title", "hot"),
                &AuditContext::new("bot"),
            )
            .await
            .unwrap();
        assert_eq!(changed, 1);

        let hot = repo.find_one(Filter::eq("title", "hot")).await.unwrap().unwrap();
        assert_eq!(hot.audit.last_modified_by.as_deref(), Some("bot"));
        assert_eq!(
            repo.update_many_with_fields(Filter::all(), FieldUpdates::new(), &editor())
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_transaction_commit_rollback_and_error() {
        let repo = repo().await;

        let committed = repo
            .execute_in_transaction(transaction_work(|tx| {
                Box::pin(async move {
                    tx.create(Article::new("kept", None), &AuditContext::system())
                        .await?;
                    Ok::<_, AppError>(true)
                })
            }))
            .await
            .unwrap();
        assert!(committed);

        let rolled_back = repo
            .execute_in_transaction(transaction_work(|tx| {
                Box::pin(async move {
                    tx.create(Article::new("dropped", None), &AuditContext::system())
                        .await?;
                    Ok::<_, AppError>(false)
                })
            }))
            .await
            .unwrap();
        assert!(!rolled_back);

        let err = repo
            .execute_in_transaction(transaction_work(|tx| {
                Box::pin(async move {
                    tx.create(Article::new("failed", None), &AuditContext::system())
                        .await?;
                    Err::<bool, _>(AppError::conflict("boom"))
                })
            }))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);

        let titles: Vec<String> = repo
            .get_all()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.title)
            .collect();
        assert_eq!(titles, vec!["kept".to_string()]);
    }

    /// Embedded collection that reports a tiny id lookup limit and counts
    /// selects.
    #[derive(Debug)]
    struct NarrowLookups {
        inner: Arc<dyn StorageAdapter>,
        selects: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl StorageAdapter for NarrowLookups {
        fn provider(&self) -> &str {
            self.inner.provider()
        }

        fn name(&self) -> &str {
            self.inner.name()
        }

        fn schema(&self) -> &'static EntitySchema {
            self.inner.schema()
        }

        fn ids_per_lookup(&self) -> usize {
            2
        }

        async fn insert(&self, records: &[Record]) -> AppResult<()> {
            self.inner.insert(records).await
        }

        async fn replace(&self, records: &[Record]) -> AppResult<Vec<Uuid>> {
            self.inner.replace(records).await
        }

        async fn select(&self, query: &StoreQuery) -> AppResult<Vec<Record>> {
            self.selects
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.select(query).await
        }

        async fn count(&self, filter: Option<&Filter>) -> AppResult<u64> {
            self.inner.count(filter).await
        }

        async fn remove(&self, ids: &[Uuid]) -> AppResult<u64> {
            self.inner.remove(ids).await
        }

        async fn update_fields(
            &self,
            filter: Option<&Filter>,
            updates: &FieldUpdates,
        ) -> AppResult<u64> {
            self.inner.update_fields(filter, updates).await
        }

        async fn begin(
            &self,
        ) -> AppResult<Arc<dyn polystore_core::traits::storage::AdapterTransaction>> {
            self.inner.begin().await
        }
    }

    #[tokio::test]
    async fn test_id_lookups_split_by_adapter_limit() {
        let inner = repo().await.adapter().clone();
        let narrow = Arc::new(NarrowLookups {
            inner,
            selects: Default::default(),
        });
        let repo: AdapterRepository<Article> = AdapterRepository::new(narrow.clone());
        let created = repo
            .create_many(
                (0..5).map(|i| Article::new(&format!("a{i}"), Some(i))).collect(),
                &editor(),
            )
            .await
            .unwrap();
        let mut ids: Vec<Uuid> = created.iter().map(|a| a.id).collect();
        ids.push(Uuid::new_v4());
        repo.soft_delete(ids[0], &editor()).await.unwrap();

        let selects = || narrow.selects.load(std::sync::atomic::Ordering::SeqCst);
        let before = selects();
        let loaded = repo.get_by_ids(&ids).await.unwrap();
        assert_eq!(selects() - before, 3);
        assert_eq!(loaded.len(), 4);
        assert!(loaded.windows(2).all(|w| w[0].id < w[1].id));

        let removed = repo.delete_many(&ids).await.unwrap();
        assert_eq!(removed.len(), 5);
        assert!(repo.get_all_include_deleted().await.unwrap().is_empty());
    }
}
