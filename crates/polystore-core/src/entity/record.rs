//! Conversion between typed entities and engine-neutral records.

use serde_json::Value;
use uuid::Uuid;

use crate::error::{AppError, ErrorKind};
use crate::result::AppResult;
use crate::types::filter::canonical_timestamp;

use super::capability::{Entity, fields};
use super::schema::{ColumnType, EntitySchema};

/// An entity in its serialized, engine-neutral form.
pub type Record = serde_json::Map<String, Value>;

/// Serialize an entity into a record, rejecting fields missing from its schema.
pub fn to_record<T: Entity>(entity: &T) -> AppResult<Record> {
    let schema = T::schema();
    let Value::Object(record) = serde_json::to_value(entity)? else {
        return Err(AppError::serialization(format!(
            "Entity '{}' must serialize to a JSON object",
            schema.name()
        )));
    };
    ensure_declared(&record, schema)?;
    canonicalize_timestamps(record, schema)
}

fn canonicalize_timestamps(mut record: Record, schema: &EntitySchema) -> AppResult<Record> {
    let timestamps = schema
        .columns()
        .iter()
        .filter(|c| c.column_type == ColumnType::Timestamp);
    for column in timestamps {
        if let Some(Value::String(raw)) = record.get_mut(column.name) {
            *raw = canonical_timestamp(raw).map_err(|e| {
                AppError::serialization(format!(
                    "Field '{}' holds an invalid timestamp: {e}",
                    column.name
                ))
            })?;
        }
    }
    Ok(record)
}

/// Deserialize a record back into an entity.
pub fn from_record<T: Entity>(record: Record) -> AppResult<T> {
    serde_json::from_value(Value::Object(record)).map_err(|e| {
        AppError::with_source(
            ErrorKind::Serialization,
            format!("Failed to decode '{}' record: {e}", T::schema().name()),
            e,
        )
    })
}

/// Read the identifier of a record.
pub fn record_id(record: &Record) -> AppResult<Uuid> {
    record
        .get(fields::ID)
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| AppError::serialization("Record has no valid 'id' field"))
}

fn ensure_declared(record: &Record, schema: &EntitySchema) -> AppResult<()> {
    match record.keys().find(|key| schema.column(key).is_none()) {
        Some(key) => Err(AppError::validation(format!(
            "Field '{key}' of entity '{}' is not declared in its schema",
            schema.name()
        ))),
        None => Ok(()),
    }
}
