//! Conversion between records and bound SQL values.
//!
//! Timestamps, UUIDs and JSON travel as text; booleans as integers on the
//! sqlx engines and `BIT` on SQL Server. Both directions are driven by the
//! schema column type, never by what the driver happens to report.

use serde_json::{Number, Value};

use polystore_core::entity::{Column, ColumnType, Record};
use polystore_core::error::{AppError, ErrorKind};
use polystore_core::result::AppResult;
use polystore_core::types::filter::FilterValue;

/// A value bound to a statement parameter or read from a row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL `NULL`, typed by the column it targets.
    Null(ColumnType),
    /// Boolean.
    Bool(bool),
    /// 64-bit integer.
    Int(i64),
    /// Double precision float.
    Float(f64),
    /// Text, including UUIDs, timestamps and serialized JSON.
    Text(String),
}

impl SqlValue {
    /// Encode one record field for `column`. A missing field is `NULL`.
    pub fn from_json(column: &Column, value: Option<&Value>) -> AppResult<SqlValue> {
        let mismatch = |value: &Value| {
            AppError::serialization(format!(
                "Field '{}' of type {} cannot store {value}",
                column.name, column.column_type
            ))
        };

        let value = match value {
            None | Some(Value::Null) => return Ok(SqlValue::Null(column.column_type)),
            Some(value) => value,
        };
        match column.column_type {
            ColumnType::Uuid | ColumnType::Text | ColumnType::Timestamp => match value {
                Value::String(s) => Ok(SqlValue::Text(s.clone())),
                other => Err(mismatch(other)),
            },
            ColumnType::Integer => value.as_i64().map(SqlValue::Int).ok_or_else(|| mismatch(value)),
            ColumnType::Float => value.as_f64().map(SqlValue::Float).ok_or_else(|| mismatch(value)),
            ColumnType::Boolean => value.as_bool().map(SqlValue::Bool).ok_or_else(|| mismatch(value)),
            ColumnType::Json => serde_json::to_string(value).map(SqlValue::Text).map_err(|e| {
                AppError::with_source(
                    ErrorKind::Serialization,
                    format!("Failed to encode field '{}': {e}", column.name),
                    e,
                )
            }),
        }
    }

    /// Encode a normalized filter or update value for `column_type`.
    pub fn from_filter(value: &FilterValue, column_type: ColumnType) -> AppResult<SqlValue> {
        if column_type == ColumnType::Json {
            return match value {
                FilterValue::Null => Ok(SqlValue::Null(column_type)),
                other => serde_json::to_string(&other.to_json())
                    .map(SqlValue::Text)
                    .map_err(AppError::from),
            };
        }
        match (value, column_type) {
            (FilterValue::Null, _) => Ok(SqlValue::Null(column_type)),
            (FilterValue::String(s), _) => Ok(SqlValue::Text(s.clone())),
            (FilterValue::Integer(i), ColumnType::Float) => Ok(SqlValue::Float(*i as f64)),
            (FilterValue::Integer(i), _) => Ok(SqlValue::Int(*i)),
            (FilterValue::Float(f), _) => Ok(SqlValue::Float(*f)),
            (FilterValue::Boolean(b), _) => Ok(SqlValue::Bool(*b)),
            (FilterValue::List(_), _) => Err(AppError::validation(
                "A list value can only be bound through IN / NOT IN",
            )),
        }
    }

    /// Decode a value read from a `column` back into its record shape.
    pub fn into_json(self, column: &Column) -> AppResult<Value> {
        let value = match (self, column.column_type) {
            (SqlValue::Null(_), _) => Value::Null,
            (SqlValue::Bool(b), _) => Value::Bool(b),
            (SqlValue::Int(i), ColumnType::Boolean) => Value::Bool(i != 0),
            (SqlValue::Int(i), ColumnType::Float) => float_json(i as f64),
            (SqlValue::Int(i), _) => Value::Number(i.into()),
            (SqlValue::Float(f), _) => float_json(f),
            (SqlValue::Text(s), ColumnType::Json) => serde_json::from_str(&s).map_err(|e| {
                AppError::with_source(
                    ErrorKind::Serialization,
                    format!("Column '{}' holds invalid JSON: {e}", column.name),
                    e,
                )
            })?,
            (SqlValue::Text(s), _) => Value::String(s),
        };
        Ok(value)
    }
}

fn float_json(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

/// Encode every schema column of `record`, in schema order.
pub fn record_values(columns: &[Column], record: &Record) -> AppResult<Vec<SqlValue>> {
    columns
        .iter()
        .map(|column| SqlValue::from_json(column, record.get(column.name)))
        .collect()
}

/// Rebuild a record from one row selected in schema column order.
pub fn row_record(columns: &[Column], row: Vec<SqlValue>) -> AppResult<Record> {
    if row.len() != columns.len() {
        return Err(AppError::database(format!(
            "Expected {} columns, got {}",
            columns.len(),
            row.len()
        )));
    }
    let mut record = Record::new();
    for (column, value) in columns.iter().zip(row) {
        record.insert(column.name.to_string(), value.into_json(column)?);
    }
    Ok(record)
}
