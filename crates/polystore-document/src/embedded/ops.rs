//! Collection operations shared by the embedded adapter and its transactions.

use uuid::Uuid;

use polystore_core::entity::{Record, record_id};
use polystore_core::error::AppError;
use polystore_core::result::AppResult;
use polystore_core::traits::storage::StoreQuery;
use polystore_core::types::filter::Filter;
use polystore_core::types::sorting::compare_records;
use polystore_core::types::update::FieldUpdates;

use super::engine::Documents;

pub(crate) fn select(documents: &Documents, query: &StoreQuery) -> Vec<Record> {
    let mut rows: Vec<&Record> = documents
        .values()
        .filter(|doc| matches(doc, query.filter.as_ref()))
        .collect();
    if !query.sort.is_empty() {
        rows.sort_by(|a, b| compare_records(a, b, &query.sort));
    }
    let skip = query.skip.unwrap_or(0) as usize;
    let limit = query.limit.map_or(usize::MAX, |l| l as usize);
    rows.into_iter().skip(skip).take(limit).cloned().collect()
}

pub(crate) fn count(documents: &Documents, filter: Option<&Filter>) -> u64 {
    documents.values().filter(|doc| matches(doc, filter)).count() as u64
}

/// All-or-nothing: every identifier is checked before anything is inserted.
pub(crate) fn insert(documents: &mut Documents, records: &[Record]) -> AppResult<()> {
    let mut keyed = Vec::with_capacity(records.len());
    for record in records {
        let id = record_id(record)?.to_string();
        if documents.contains_key(&id) || keyed.iter().any(|(k, _)| k == &id) {
            return Err(AppError::conflict(format!(
                "A document with id '{id}' already exists"
            )));
        }
        keyed.push((id, record.clone()));
    }
    documents.extend(keyed);
    Ok(())
}

pub(crate) fn replace(documents: &mut Documents, records: &[Record]) -> AppResult<Vec<Uuid>> {
    let mut replaced = Vec::new();
    for record in records {
        let id = record_id(record)?;
        if let Some(existing) = documents.get_mut(&id.to_string()) {
            *existing = record.clone();
            replaced.push(id);
        }
    }
    Ok(replaced)
}

pub(crate) fn remove(documents: &mut Documents, ids: &[Uuid]) -> u64 {
    ids.iter()
        .filter(|id| documents.remove(&id.to_string()).is_some())
        .count() as u64
}

pub(crate) fn update_fields(
    documents: &mut Documents,
    filter: Option<&Filter>,
    updates: &FieldUpdates,
) -> u64 {
    let mut changed = 0;
    for doc in documents.values_mut().filter(|doc| matches(doc, filter)) {
        for assignment in updates.assignments() {
            doc.insert(assignment.field.clone(), assignment.value.to_json());
        }
        changed += 1;
    }
    changed
}

fn matches(doc: &Record, filter: Option<&Filter>) -> bool {
    filter.is_none_or(|f| f.matches(doc))
}
