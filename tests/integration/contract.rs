//! The repository contract, written once and run against every provider.

#![allow(dead_code)]

use std::collections::HashSet;

use uuid::Uuid;

use polystore::prelude::*;

use crate::helpers::{Article, Label, editor};

/// Generate one `#[tokio::test]` per contract check for a provider setup
/// expression yielding a `DataAccess`.
macro_rules! contract_suite {
    ($setup:expr) => {
        contract_suite!(@tests $setup;
            create_assigns_id_and_round_trips,
            update_preserves_creation_stamp,
            update_of_missing_entity_returns_none,
            soft_delete_and_restore,
            pages_are_disjoint_and_counted,
            oversized_pages_return_everything,
            large_id_lists_are_looked_up,
            delete_many_returns_found_subset,
            filters_behave_uniformly,
            sorting_is_stable_with_nulls_first,
            query_parameters_combine_filter_sort_and_page,
            field_updates_stamp_audit,
            transactions_commit_and_roll_back,
            failed_batch_writes_nothing,
            validation_rejects_bad_arguments,
            plain_entities_skip_soft_delete,
        );
    };
    (@tests $setup:expr; $($check:ident),+ $(,)?) => {
        $(
            #[tokio::test]
            async fn $check() {
                let access = $setup.await;
                crate::contract::$check(&access).await;
            }
        )+
    };
}

/// Every check in order; `atomic_batches` is false for engines whose batch
/// inserts are ordered best-effort.
pub async fn full_contract(access: &DataAccess, atomic_batches: bool) {
    create_assigns_id_and_round_trips(access).await;
    update_preserves_creation_stamp(access).await;
    update_of_missing_entity_returns_none(access).await;
    soft_delete_and_restore(access).await;
    pages_are_disjoint_and_counted(access).await;
    oversized_pages_return_everything(access).await;
    large_id_lists_are_looked_up(access).await;
    delete_many_returns_found_subset(access).await;
    filters_behave_uniformly(access).await;
    sorting_is_stable_with_nulls_first(access).await;
    query_parameters_combine_filter_sort_and_page(access).await;
    field_updates_stamp_audit(access).await;
    transactions_commit_and_roll_back(access).await;
    if atomic_batches {
        failed_batch_writes_nothing(access).await;
    }
    validation_rejects_bad_arguments(access).await;
    plain_entities_skip_soft_delete(access).await;
}

async fn clean(access: &DataAccess) -> RepositoryFactory<Article> {
    let repo = access.repository::<Article>().await.unwrap();
    let ids: Vec<Uuid> = repo
        .get_all_include_deleted()
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.id)
        .collect();
    if !ids.is_empty() {
        repo.delete_many(&ids).await.unwrap();
    }
    repo
}

fn titles(items: &[Article]) -> Vec<&str> {
    items.iter().map(|a| a.title.as_str()).collect()
}

pub async fn create_assigns_id_and_round_trips(access: &DataAccess) {
    let repo = clean(access).await;
    let created = repo
        .create(
            Article::new("Round trip")
                .summary("every column")
                .views(42)
                .rating(4.25)
                .published()
                .tags(&["rust", "storage"]),
            &editor(),
        )
        .await
        .unwrap();

    assert!(!created.id.is_nil());
    assert_eq!(created.audit.created_by.as_deref(), Some("editor"));
    assert!(created.audit.created_date.is_some());
    assert!(created.audit.last_modified_date.is_none());
    assert!(!created.deletion.is_deleted);

    let loaded = repo.get_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(loaded, created);

    let by_ids = repo
        .get_by_ids(&[created.id, Uuid::new_v4()])
        .await
        .unwrap();
    assert_eq!(by_ids, vec![created]);
}

pub async fn update_preserves_creation_stamp(access: &DataAccess) {
    let repo = clean(access).await;
    let created = repo.create(Article::new("Draft"), &editor()).await.unwrap();

    let mut edited = created.clone();
    edited.title = "Final".to_string();
    edited.audit.created_date = None;
    edited.audit.created_by = Some("impostor".to_string());
    let updated = repo
        .update(edited, &AuditContext::new("reviewer"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.audit.created_date, created.audit.created_date);
    assert_eq!(updated.audit.created_by.as_deref(), Some("editor"));
    assert_eq!(updated.audit.last_modified_by.as_deref(), Some("reviewer"));
    assert!(updated.audit.last_modified_date >= created.audit.created_date);

    let loaded = repo.get_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(loaded.title, "Final");
    assert_eq!(loaded.audit, updated.audit);

    let batch = repo
        .update_many(vec![loaded.clone()], &AuditContext::system())
        .await
        .unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].audit.created_date, created.audit.created_date);
    assert_eq!(batch[0].audit.last_modified_by.as_deref(), Some("system"));
}

pub async fn update_of_missing_entity_returns_none(access: &DataAccess) {
    let repo = clean(access).await;
    let mut ghost = Article::new("Ghost");
    ghost.id = Uuid::new_v4();
    assert!(repo.update(ghost.clone(), &editor()).await.unwrap().is_none());
    assert!(repo.update_many(vec![ghost], &editor()).await.unwrap().is_empty());
    assert_eq!(repo.count().await.unwrap(), 0);
}

pub async fn soft_delete_and_restore(access: &DataAccess) {
    let repo = clean(access).await;
    let kept = repo.create(Article::new("Kept"), &editor()).await.unwrap();
    let hidden = repo.create(Article::new("Hidden"), &editor()).await.unwrap();

    let deleted = repo
        .soft_delete(hidden.id, &AuditContext::new("moderator"))
        .await
        .unwrap()
        .unwrap();
    assert!(deleted.deletion.is_deleted);
    assert!(deleted.deletion.deleted_date.is_some());
    assert_eq!(deleted.deletion.deleted_by.as_deref(), Some("moderator"));

    assert!(repo.get_by_id(hidden.id).await.unwrap().is_none());
    assert_eq!(repo.get_all().await.unwrap(), vec![kept.clone()]);
    assert_eq!(repo.count().await.unwrap(), 1);
    assert!(!repo.exists(Filter::eq("title", "Hidden")).await.unwrap());
    assert_eq!(repo.get_all_include_deleted().await.unwrap().len(), 2);

    // Soft-deleted rows cannot be updated through the default path.
    assert!(repo.update(deleted.clone(), &editor()).await.unwrap().is_none());

    let restored = repo.restore(hidden.id).await.unwrap().unwrap();
    assert_eq!(restored.deletion, SoftDeleteStamp::default());
    assert_eq!(repo.count().await.unwrap(), 2);
    assert!(repo.restore(Uuid::new_v4()).await.unwrap().is_none());
}

pub async fn pages_are_disjoint_and_counted(access: &DataAccess) {
    let repo = clean(access).await;
    let batch = (0..23)
        .map(|i| Article::new(&format!("Page {i:02}")).views(i % 4))
        .collect();
    repo.create_many(batch, &editor()).await.unwrap();

    let sort = vec![SortField::desc("views")];
    let mut seen = HashSet::new();
    let mut previous: Option<i64> = None;
    for page in 1..=5 {
        let result = repo
            .get_paged_sorted(sort.clone(), PageRequest::new(page, 5))
            .await
            .unwrap();
        assert_eq!(result.total_count, repo.count().await.unwrap());
        assert_eq!(result.total_pages(), 5);
        assert_eq!(result.has_next(), page < 5);
        for item in result.items {
            if let Some(prev) = previous {
                assert!(item.views.unwrap() <= prev);
            }
            previous = item.views;
            assert!(seen.insert(item.id), "{} repeated", item.title);
        }
    }
    assert_eq!(seen.len(), 23);

    let beyond = repo.get_paged(PageRequest::new(6, 5)).await.unwrap();
    assert!(beyond.items.is_empty());
    assert_eq!(beyond.total_count, 23);

    let filtered = repo
        .find_paged(Filter::eq("views", 0), PageRequest::new(1, 4))
        .await
        .unwrap();
    assert_eq!(filtered.total_count, 6);
    assert_eq!(filtered.items.len(), 4);
}

pub async fn oversized_pages_return_everything(access: &DataAccess) {
    let repo = clean(access).await;
    repo.create_many(
        vec![Article::new("only").views(1), Article::new("other").views(2)],
        &editor(),
    )
    .await
    .unwrap();

    let all = repo.get_paged(PageRequest::new(1, u64::MAX)).await.unwrap();
    assert_eq!(all.items.len(), 2);
    assert_eq!(all.total_count, 2);
    assert_eq!(all.total_pages(), 1);

    let sorted = repo
        .find_paged_sorted(
            Filter::gt("views", 0),
            vec![SortField::desc("views")],
            PageRequest::new(1, u64::MAX),
        )
        .await
        .unwrap();
    assert_eq!(titles(&sorted.items), vec!["other", "only"]);

    let beyond = repo
        .get_paged(PageRequest::new(u64::MAX, u64::MAX))
        .await
        .unwrap();
    assert!(beyond.items.is_empty());
    assert_eq!(beyond.total_count, 2);
}

/// Id lists larger than any engine's bound-parameter limit.
pub async fn large_id_lists_are_looked_up(access: &DataAccess) {
    let repo = clean(access).await;
    let created = repo
        .create_many(
            vec![Article::new("kept"), Article::new("found"), Article::new("gone")],
            &editor(),
        )
        .await
        .unwrap();
    let [kept, found, gone] = [&created[0], &created[1], &created[2]];

    let mut ids: Vec<Uuid> = (0..40_000).map(|_| Uuid::new_v4()).collect();
    ids.insert(20_000, found.id);
    ids.push(gone.id);

    let mut loaded: Vec<Uuid> = repo
        .get_by_ids(&ids)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.id)
        .collect();
    loaded.sort();
    let mut expected = vec![found.id, gone.id];
    expected.sort();
    assert_eq!(loaded, expected);

    repo.soft_delete(gone.id, &editor()).await.unwrap();
    let visible = repo.get_by_ids(&ids).await.unwrap();
    assert_eq!(titles(&visible), vec!["found"]);

    let updated = repo
        .update_many(
            vec![Article {
                title: "renamed".to_string(),
                ..found.clone()
            }],
            &editor(),
        )
        .await
        .unwrap();
    assert_eq!(titles(&updated), vec!["renamed"]);

    let mut removed: Vec<Uuid> = repo
        .delete_many(&ids)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.id)
        .collect();
    removed.sort();
    assert_eq!(removed, expected);
    assert_eq!(
        repo.get_all_include_deleted().await.unwrap(),
        vec![kept.clone()]
    );
}

pub async fn delete_many_returns_found_subset(access: &DataAccess) {
    let repo = clean(access).await;
    let a = repo.create(Article::new("A"), &editor()).await.unwrap();
    let b = repo.create(Article::new("B"), &editor()).await.unwrap();
    let c = repo.create(Article::new("C"), &editor()).await.unwrap();
    repo.soft_delete(c.id, &editor()).await.unwrap();

    let removed = repo
        .delete_many(&[a.id, c.id, Uuid::new_v4()])
        .await
        .unwrap();
    let mut removed_ids: Vec<Uuid> = removed.iter().map(|e| e.id).collect();
    removed_ids.sort();
    let mut expected = vec![a.id, c.id];
    expected.sort();
    assert_eq!(removed_ids, expected);

    assert_eq!(repo.get_all_include_deleted().await.unwrap(), vec![b.clone()]);
    assert_eq!(repo.delete(b.id).await.unwrap(), Some(b.clone()));
    assert!(repo.delete(b.id).await.unwrap().is_none());
}

pub async fn filters_behave_uniformly(access: &DataAccess) {
    let repo = clean(access).await;
    let batch = vec![
        Article::new("Rust Patterns")
            .summary("ownership")
            .views(10)
            .rating(4.5)
            .published()
            .tags(&["rust"]),
        Article::new("async rust").rating(3.0),
        Article::new("Go Basics").summary("RUSTY").views(3).published(),
    ];
    repo.create_many(batch, &editor()).await.unwrap();

    let check = |filter: Filter, expected: &'static [&'static str]| {
        let repo = repo.clone();
        async move {
            let mut found = titles(&repo.find(filter.clone()).await.unwrap())
                .into_iter()
                .map(str::to_string)
                .collect::<Vec<_>>();
            found.sort();
            let mut expected: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
            expected.sort();
            assert_eq!(found, expected, "{filter:?}");
            assert_eq!(
                repo.count_matching(filter.clone()).await.unwrap(),
                expected.len() as u64,
                "{filter:?}"
            );
        }
    };

    check(Filter::all(), &["Rust Patterns", "async rust", "Go Basics"]).await;
    check(Filter::Or(Vec::new()), &[]).await;
    check(Filter::contains("title", "RUST"), &["Rust Patterns", "async rust"]).await;
    check(Filter::contains("summary", "rust"), &["Go Basics"]).await;
    check(Filter::contains("title", "%"), &[]).await;
    check(Filter::eq("summary", None::<String>), &["async rust"]).await;
    check(Filter::is_not_null("views"), &["Rust Patterns", "Go Basics"]).await;
    check(Filter::gt("views", 2), &["Rust Patterns", "Go Basics"]).await;
    check(Filter::ne("views", 10), &["Go Basics"]).await;
    check(Filter::lte("views", 3), &["Go Basics"]).await;
    check(Filter::gte("rating", 3), &["Rust Patterns", "async rust"]).await;
    check(Filter::in_list("views", vec![3, 10]), &["Rust Patterns", "Go Basics"]).await;
    check(Filter::not_in("views", vec![3]), &["Rust Patterns"]).await;
    check(Filter::in_list("views", Vec::<i64>::new()), &[]).await;
    check(
        Filter::not_in("views", Vec::<i64>::new()),
        &["Rust Patterns", "Go Basics"],
    )
    .await;
    check(
        Filter::eq("published", true).and(Filter::gte("rating", 4.0)),
        &["Rust Patterns"],
    )
    .await;
    check(
        Filter::eq("published", false).or(Filter::lt("rating", 4.0)),
        &["async rust"],
    )
    .await;
    check(Filter::is_not_null("tags"), &["Rust Patterns"]).await;
    check(
        Filter::lte("published_at", chrono::Utc::now()),
        &["Rust Patterns", "Go Basics"],
    )
    .await;

    let first = repo
        .find_one(Filter::contains("title", "rust"))
        .await
        .unwrap()
        .unwrap();
    assert!(first.title.to_lowercase().contains("rust"));
    assert!(repo.exists(Filter::eq("title", "Go Basics")).await.unwrap());
    assert!(!repo.exists(Filter::eq("title", "go basics")).await.unwrap());
}

pub async fn sorting_is_stable_with_nulls_first(access: &DataAccess) {
    let repo = clean(access).await;
    let created = repo
        .create_many(
            vec![
                Article::new("five-a").views(5),
                Article::new("none"),
                Article::new("one").views(1),
                Article::new("five-b").views(5),
            ],
            &editor(),
        )
        .await
        .unwrap();

    let mut fives: Vec<&Article> = created.iter().filter(|a| a.views == Some(5)).collect();
    fives.sort_by_key(|a| a.id);
    let fives: Vec<&str> = fives.iter().map(|a| a.title.as_str()).collect();

    let ascending = repo
        .get_all_sorted(vec![SortField::asc("views")])
        .await
        .unwrap();
    assert_eq!(titles(&ascending), vec!["none", "one", fives[0], fives[1]]);

    let descending = repo
        .get_all_sorted(vec![SortField::desc("views")])
        .await
        .unwrap();
    assert_eq!(titles(&descending), vec![fives[0], fives[1], "one", "none"]);

    let by_two_keys = repo
        .find_sorted(
            Filter::is_not_null("views"),
            vec![SortField::desc("views"), SortField::desc("title")],
        )
        .await
        .unwrap();
    assert_eq!(titles(&by_two_keys), vec!["five-b", "five-a", "one"]);

    let by_id = repo.get_all().await.unwrap();
    assert!(by_id.windows(2).all(|w| w[0].id < w[1].id));
}

pub async fn query_parameters_combine_filter_sort_and_page(access: &DataAccess) {
    let repo = clean(access).await;
    let batch = (0..10)
        .map(|i| Article::new(&format!("Q{i}")).views(i))
        .collect();
    repo.create_many(batch, &editor()).await.unwrap();

    let params = QueryParameters::new()
        .filter(Filter::gte("views", 4))
        .sort_by(SortField::asc("views"))
        .page(2, 4);
    let page = repo.query(params).await.unwrap();
    assert_eq!(page.total_count, 6);
    assert_eq!(titles(&page.items), vec!["Q8", "Q9"]);
    assert!(page.has_previous());
    assert!(!page.has_next());

    let unsorted = repo.query(QueryParameters::new()).await.unwrap();
    assert_eq!(unsorted.total_count, 10);

    let sorted_page = repo
        .find_paged_sorted(
            Filter::lt("views", 5),
            vec![SortField::desc("views")],
            PageRequest::new(1, 2),
        )
        .await
        .unwrap();
    assert_eq!(titles(&sorted_page.items), vec!["Q4", "Q3"]);
    assert_eq!(sorted_page.total_count, 5);
}

pub async fn field_updates_stamp_audit(access: &DataAccess) {
    let repo = clean(access).await;
    let batch = vec![
        Article::new("Draft 1"),
        Article::new("Draft 2"),
        Article::new("Live").published(),
    ];
    let created = repo.create_many(batch, &editor()).await.unwrap();
    repo.soft_delete(created[1].id, &editor()).await.unwrap();

    let changed = repo
        .update_many_with_fields(
            Filter::eq("published", false),
            FieldUpdates::new().set("summary", "pending review").set("views", 0),
            &AuditContext::new("bot"),
        )
        .await
        .unwrap();
    assert_eq!(changed, 1);

    let draft = repo.get_by_id(created[0].id).await.unwrap().unwrap();
    assert_eq!(draft.summary.as_deref(), Some("pending review"));
    assert_eq!(draft.views, Some(0));
    assert_eq!(draft.audit.last_modified_by.as_deref(), Some("bot"));
    assert!(draft.audit.last_modified_date.is_some());
    assert_eq!(draft.audit.created_date, created[0].audit.created_date);

    let live = repo.get_by_id(created[2].id).await.unwrap().unwrap();
    assert!(live.summary.is_none());

    let cleared = repo
        .update_many_with_fields(
            Filter::all(),
            FieldUpdates::new().set("summary", None::<String>),
            &editor(),
        )
        .await
        .unwrap();
    assert_eq!(cleared, 2);
    assert!(repo.find(Filter::is_not_null("summary")).await.unwrap().is_empty());

    assert_eq!(
        repo.update_many_with_fields(Filter::all(), FieldUpdates::new(), &editor())
            .await
            .unwrap(),
        0
    );
    for updates in [
        FieldUpdates::new().set("id", Uuid::new_v4()),
        FieldUpdates::new().set("created_by", "someone"),
        FieldUpdates::new().set("missing", 1),
        FieldUpdates::new().set("views", "many"),
    ] {
        let err = repo
            .update_many_with_fields(Filter::all(), updates, &editor())
            .await
            .unwrap_err();
        assert!(err.is_validation(), "{err}");
    }
}

pub async fn transactions_commit_and_roll_back(access: &DataAccess) {
    let repo = clean(access).await;

    let committed = repo
        .execute_in_transaction(transaction_work(|tx| {
            Box::pin(async move {
                let ctx = AuditContext::new("tx");
                tx.create(Article::new("tx-1"), &ctx).await?;
                tx.create(Article::new("tx-2"), &ctx).await?;
                assert_eq!(tx.count().await?, 2);
                Ok::<_, AppError>(true)
            })
        }))
        .await
        .unwrap();
    assert!(committed);
    assert_eq!(repo.count().await.unwrap(), 2);

    let rolled_back = repo
        .execute_in_transaction(transaction_work(|tx| {
            Box::pin(async move {
                tx.create(Article::new("discarded"), &AuditContext::system())
                    .await?;
                Ok::<_, AppError>(false)
            })
        }))
        .await
        .unwrap();
    assert!(!rolled_back);
    assert_eq!(repo.count().await.unwrap(), 2);

    let err = repo
        .execute_in_transaction(transaction_work(|tx| {
            Box::pin(async move {
                tx.create(Article::new("failed"), &AuditContext::system())
                    .await?;
                Err::<bool, _>(AppError::conflict("work failed"))
            })
        }))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
    assert_eq!(err.message, "work failed");
    assert!(!repo.exists(Filter::eq("title", "failed")).await.unwrap());

    let nested = repo
        .execute_in_transaction(transaction_work(|tx| {
            Box::pin(async move {
                let inner = tx
                    .execute_in_transaction(transaction_work(|_| Box::pin(async { Ok::<_, AppError>(true) })))
                    .await;
                assert_eq!(inner.unwrap_err().kind, ErrorKind::NotSupported);
                Ok::<_, AppError>(false)
            })
        }))
        .await
        .unwrap();
    assert!(!nested);
}

pub async fn failed_batch_writes_nothing(access: &DataAccess) {
    let repo = clean(access).await;
    let existing = repo.create(Article::new("Existing"), &editor()).await.unwrap();

    let mut duplicate = Article::new("Duplicate");
    duplicate.id = existing.id;
    let err = repo
        .create_many(vec![Article::new("Fresh"), duplicate], &editor())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
    assert_eq!(titles(&repo.get_all().await.unwrap()), vec!["Existing"]);

    let mut again = Article::new("Again");
    again.id = existing.id;
    assert_eq!(
        repo.create(again, &editor()).await.unwrap_err().kind,
        ErrorKind::Conflict
    );
}

pub async fn validation_rejects_bad_arguments(access: &DataAccess) {
    let repo = clean(access).await;
    let errors = vec![
        repo.get_by_id(Uuid::nil()).await.map(|_| ()),
        repo.delete(Uuid::nil()).await.map(|_| ()),
        repo.soft_delete(Uuid::nil(), &editor()).await.map(|_| ()),
        repo.get_by_ids(&[Uuid::nil()]).await.map(|_| ()),
        repo.get_paged(PageRequest::new(0, 10)).await.map(|_| ()),
        repo.get_paged(PageRequest::new(1, 0)).await.map(|_| ()),
        repo.find(Filter::eq("nope", 1)).await.map(|_| ()),
        repo.find(Filter::gt("published", true)).await.map(|_| ()),
        repo.find(Filter::contains("views", "1")).await.map(|_| ()),
        repo.find(Filter::eq("tags", "rust")).await.map(|_| ()),
        repo.get_all_sorted(Vec::new()).await.map(|_| ()),
        repo.get_all_sorted(vec![SortField::asc("")]).await.map(|_| ()),
        repo.get_all_sorted(vec![SortField::asc("tags")]).await.map(|_| ()),
        repo.query(QueryParameters::new().sort_by(SortField::desc("tags")))
            .await
            .map(|_| ()),
        repo.query(QueryParameters::new().sort_by(SortField::asc("nope")))
            .await
            .map(|_| ()),
    ];
    for result in errors {
        let err = result.unwrap_err();
        assert!(err.is_validation(), "{err}");
    }
}

pub async fn plain_entities_skip_soft_delete(access: &DataAccess) {
    let repo = access.repository::<Label>().await.unwrap();
    let created = repo.create(Label::new("plain"), &editor()).await.unwrap();

    assert!(repo.soft_delete(created.id, &editor()).await.unwrap().is_none());
    assert!(repo.restore(created.id).await.unwrap().is_none());
    assert_eq!(repo.get_by_id(created.id).await.unwrap(), Some(created.clone()));

    let changed = repo
        .update_many_with_fields(
            Filter::eq("id", created.id),
            FieldUpdates::new().set("name", "renamed"),
            &editor(),
        )
        .await
        .unwrap();
    assert_eq!(changed, 1);
    assert_eq!(repo.delete(created.id).await.unwrap().unwrap().name, "renamed");
}
