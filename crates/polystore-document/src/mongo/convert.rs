//! Record, filter, sort and error conversion for MongoDB.

use mongodb::bson::{self, Bson, Document, doc};
use serde_json::Value;

use polystore_core::entity::{Record, record_id};
use polystore_core::error::{AppError, ErrorKind};
use polystore_core::result::AppResult;
use polystore_core::types::filter::{Filter, FilterField, FilterOp, FilterValue};
use polystore_core::types::sorting::SortField;
use polystore_core::types::update::FieldUpdates;

/// Convert a record into a document keyed by `_id = id`.
pub(crate) fn to_document(record: &Record) -> AppResult<Document> {
    let id = record_id(record)?;
    let mut document = bson::to_document(record).map_err(|e| {
        AppError::with_source(
            ErrorKind::Serialization,
            format!("Failed to encode document {id}: {e}"),
            e,
        )
    })?;
    document.insert("_id", id.to_string());
    Ok(document)
}

/// Convert a stored document back into a record, dropping `_id`.
pub(crate) fn to_record(mut document: Document) -> AppResult<Record> {
    document.remove("_id");
    match Bson::Document(document).into_relaxed_extjson() {
        Value::Object(record) => Ok(record),
        other => Err(AppError::serialization(format!(
            "Expected a JSON object from MongoDB, got {other}"
        ))),
    }
}

/// Translate an optional filter into a query document.
pub(crate) fn filter_document(filter: Option<&Filter>) -> Document {
    filter.map_or_else(Document::new, translate)
}

/// Build the `{ _id: { $in: [...] } }` selector for a set of identifiers.
pub(crate) fn ids_document(ids: impl IntoIterator<Item = String>) -> Document {
    let ids: Vec<Bson> = ids.into_iter().map(Bson::String).collect();
    doc! { "_id": { "$in": ids } }
}

/// Translate sort keys into a sort document, keys in priority order.
pub(crate) fn sort_document(sort: &[SortField]) -> Option<Document> {
    if sort.is_empty() {
        return None;
    }
    let mut document = Document::new();
    for key in sort {
        document.insert(key.field.clone(), key.direction.as_mongo());
    }
    Some(document)
}

/// Translate field assignments into a `$set` update.
pub(crate) fn set_document(updates: &FieldUpdates) -> Document {
    let mut set = Document::new();
    for assignment in updates.assignments() {
        set.insert(assignment.field.clone(), to_bson(&assignment.value));
    }
    doc! { "$set": set }
}

/// Map a driver error into an [`AppError`].
pub(crate) fn map_error(err: mongodb::error::Error, context: &str) -> AppError {
    use mongodb::error::ErrorKind as MongoKind;

    let message = format!("{context}: {err}");
    let kind = if message.contains("E11000") {
        ErrorKind::Conflict
    } else {
        match err.kind.as_ref() {
            MongoKind::Io(_) | MongoKind::ServerSelection { .. } => ErrorKind::ServiceUnavailable,
            MongoKind::BsonSerialization(_) | MongoKind::BsonDeserialization(_) => {
                ErrorKind::Serialization
            }
            MongoKind::Transaction { .. } => ErrorKind::Transaction,
            _ => ErrorKind::Database,
        }
    };
    AppError::with_source(kind, message, err)
}

fn translate(filter: &Filter) -> Document {
    match filter {
        Filter::Field(field) => field_condition(field),
        Filter::And(children) if children.is_empty() => Document::new(),
        Filter::And(children) => {
            let children: Vec<Document> = children.iter().map(translate).collect();
            doc! { "$and": children }
        }
        // Matches nothing: no document has an `_id` in the empty set.
        Filter::Or(children) if children.is_empty() => doc! { "_id": { "$in": [] } },
        Filter::Or(children) => {
            let children: Vec<Document> = children.iter().map(translate).collect();
            doc! { "$or": children }
        }
    }
}

fn field_condition(field: &FilterField) -> Document {
    let value = to_bson(&field.value);
    let condition = match field.op {
        FilterOp::Eq => doc! { "$eq": value },
        FilterOp::Ne => doc! { "$nin": [value, Bson::Null] },
        FilterOp::Gt => doc! { "$gt": value },
        FilterOp::Gte => doc! { "$gte": value },
        FilterOp::Lt => doc! { "$lt": value },
        FilterOp::Lte => doc! { "$lte": value },
        FilterOp::Contains => {
            let needle = match &field.value {
                FilterValue::String(s) => escape_regex(s),
                _ => String::new(),
            };
            doc! { "$regex": needle, "$options": "i" }
        }
        FilterOp::In => doc! { "$in": value },
        FilterOp::NotIn => {
            let mut excluded = match value {
                Bson::Array(items) => items,
                other => vec![other],
            };
            excluded.push(Bson::Null);
            doc! { "$nin": excluded }
        }
        FilterOp::IsNull => doc! { "$eq": Bson::Null },
        FilterOp::IsNotNull => doc! { "$ne": Bson::Null },
    };
    let mut document = Document::new();
    document.insert(field.field.clone(), condition);
    document
}

fn to_bson(value: &FilterValue) -> Bson {
    match value {
        FilterValue::String(s) => Bson::String(s.clone()),
        FilterValue::Integer(i) => Bson::Int64(*i),
        FilterValue::Float(f) => Bson::Double(*f),
        FilterValue::Boolean(b) => Bson::Boolean(*b),
        FilterValue::List(items) => Bson::Array(items.iter().map(to_bson).collect()),
        FilterValue::Null => Bson::Null,
    }
}

fn escape_regex(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if "\\^$.|?*+()[]{}".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Ascending single-field index keys.
pub(crate) fn index_keys(field: &str) -> Document {
    let mut keys = Document::new();
    keys.insert(field, 1);
    keys
}
