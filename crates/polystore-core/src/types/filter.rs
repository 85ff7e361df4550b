//! Filter expressions shared by every storage engine.
//!
//! A [`Filter`] is a small typed tree that each adapter translates into its
//! native query language. The semantics are fixed here so that every engine
//! returns the same rows:
//!
//! * comparisons (`Eq`, `Ne`, `Gt`, ..., `In`, `NotIn`, `Contains`) never match
//!   a null or missing field;
//! * `Eq(Null)` means `IsNull` and `Ne(Null)` means `IsNotNull`;
//! * `Contains` is a case-insensitive substring match;
//! * an empty `And` matches everything and an empty `Or` matches nothing.
//!
//! [`Filter::matches`] is the reference evaluator over a [`Record`].

use std::cmp::Ordering;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::entity::{ColumnType, EntitySchema, Record};
use crate::error::AppError;
use crate::result::AppResult;

/// Filter comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    /// Exact equality.
    Eq,
    /// Not equal.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Case-insensitive substring match.
    Contains,
    /// List membership.
    In,
    /// List exclusion.
    NotIn,
    /// Field is null or missing.
    IsNull,
    /// Field is present and not null.
    IsNotNull,
}

impl FilterOp {
    fn is_ordering(&self) -> bool {
        matches!(self, Self::Gt | Self::Gte | Self::Lt | Self::Lte)
    }
}

/// A dynamic value used by filters and field updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// A string value (also UUIDs and timestamps).
    String(String),
    /// An integer value.
    Integer(i64),
    /// A floating-point value.
    Float(f64),
    /// A boolean value.
    Boolean(bool),
    /// A list of values (for `In` / `NotIn`).
    List(Vec<FilterValue>),
    /// Null / no value.
    Null,
}

impl FilterValue {
    /// Convert into the JSON value stored in a [`Record`].
    pub fn to_json(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Integer(i) => Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Boolean(b) => Value::Bool(*b),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Null => Value::Null,
        }
    }

    /// Whether this is [`FilterValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Boolean(_) => "boolean",
            Self::List(_) => "list",
            Self::Null => "null",
        }
    }

    /// Check the value against a column type, canonicalizing timestamps.
    ///
    /// `Null` is accepted here; nullability is the caller's concern.
    pub fn conform(self, field: &str, column_type: ColumnType) -> AppResult<FilterValue> {
        let mismatch = |value: &FilterValue| {
            AppError::validation(format!(
                "Field '{field}' of type {column_type} cannot hold a {} value",
                value.kind()
            ))
        };
        match (column_type, self) {
            (_, Self::Null) => Ok(Self::Null),
            (ColumnType::Text, v @ Self::String(_)) => Ok(v),
            (ColumnType::Uuid, Self::String(s)) => Uuid::parse_str(&s)
                .map(|id| Self::String(id.to_string()))
                .map_err(|_| AppError::validation(format!("Field '{field}' expects a UUID, got '{s}'"))),
            (ColumnType::Timestamp, Self::String(s)) => canonical_timestamp(&s)
                .map(Self::String)
                .map_err(|_| {
                    AppError::validation(format!("Field '{field}' expects an RFC 3339 timestamp, got '{s}'"))
                }),
            (ColumnType::Integer, v @ Self::Integer(_)) => Ok(v),
            (ColumnType::Float, v @ (Self::Integer(_) | Self::Float(_))) => Ok(v),
            (ColumnType::Boolean, v @ Self::Boolean(_)) => Ok(v),
            (ColumnType::Json, v) => Ok(v),
            (_, v) => Err(mismatch(&v)),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FilterValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for FilterValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<Uuid> for FilterValue {
    fn from(value: Uuid) -> Self {
        Self::String(value.to_string())
    }
}

impl From<DateTime<Utc>> for FilterValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::String(format_timestamp(&value))
    }
}

impl<T: Into<FilterValue>> From<Option<T>> for FilterValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// A single condition on a named field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterField {
    /// The field name to filter on.
    pub field: String,
    /// The comparison operator.
    pub op: FilterOp,
    /// The value to compare against.
    pub value: FilterValue,
}

impl FilterField {
    /// Create a new filter field.
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<FilterValue>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    fn normalize(self, schema: &EntitySchema) -> AppResult<FilterField> {
        let column = schema.require_column(&self.field)?;
        let (op, value) = match (self.op, self.value) {
            (FilterOp::Eq, FilterValue::Null) | (FilterOp::IsNull, _) => {
                (FilterOp::IsNull, FilterValue::Null)
            }
            (FilterOp::Ne, FilterValue::Null) | (FilterOp::IsNotNull, _) => {
                (FilterOp::IsNotNull, FilterValue::Null)
            }
            (_, FilterValue::Null) => {
                return Err(AppError::validation(format!(
                    "Operator {:?} on field '{}' needs a non-null value",
                    self.op, self.field
                )));
            }
            (_, _) if column.column_type == ColumnType::Json => {
                return Err(AppError::validation(format!(
                    "Field '{}' stores JSON and only supports null checks",
                    self.field
                )));
            }
            (op @ (FilterOp::In | FilterOp::NotIn), FilterValue::List(items)) => {
                let items = items
                    .into_iter()
                    .map(|item| match item {
                        FilterValue::List(_) | FilterValue::Null => Err(AppError::validation(
                            format!("List filter on '{}' must hold non-null scalars", self.field),
                        )),
                        scalar => scalar.conform(&self.field, column.column_type),
                    })
                    .collect::<AppResult<Vec<_>>>()?;
                (op, FilterValue::List(items))
            }
            (FilterOp::In | FilterOp::NotIn, _) => {
                return Err(AppError::validation(format!(
                    "Operator {:?} on field '{}' needs a list value",
                    self.op, self.field
                )));
            }
            (_, FilterValue::List(_)) => {
                return Err(AppError::validation(format!(
                    "Operator {:?} on field '{}' does not accept a list",
                    self.op, self.field
                )));
            }
            (FilterOp::Contains, value) => {
                if !matches!(column.column_type, ColumnType::Text | ColumnType::Uuid)
                    || !matches!(value, FilterValue::String(_))
                {
                    return Err(AppError::validation(format!(
                        "Contains on field '{}' needs a text column and a string value",
                        self.field
                    )));
                }
                (FilterOp::Contains, value)
            }
            (op, _) if op.is_ordering() && column.column_type == ColumnType::Boolean => {
                return Err(AppError::validation(format!(
                    "Boolean field '{}' cannot be range-compared",
                    self.field
                )));
            }
            (op, value) => (op, value.conform(&self.field, column.column_type)?),
        };
        Ok(FilterField {
            field: self.field,
            op,
            value,
        })
    }

    fn matches(&self, record: &Record) -> bool {
        let actual = record.get(&self.field).filter(|v| !v.is_null());
        match (self.op, actual) {
            (FilterOp::IsNull, actual) => actual.is_none(),
            (FilterOp::IsNotNull, actual) => actual.is_some(),
            (_, None) => false,
            (FilterOp::Eq, Some(actual)) => equals(actual, &self.value),
            (FilterOp::Ne, Some(actual)) => !equals(actual, &self.value),
            (FilterOp::Gt, Some(actual)) => compare(actual, &self.value) == Some(Ordering::Greater),
            (FilterOp::Gte, Some(actual)) => matches!(
                compare(actual, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            (FilterOp::Lt, Some(actual)) => compare(actual, &self.value) == Some(Ordering::Less),
            (FilterOp::Lte, Some(actual)) => matches!(
                compare(actual, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            (FilterOp::Contains, Some(actual)) => match (actual, &self.value) {
                (Value::String(haystack), FilterValue::String(needle)) => haystack
                    .to_lowercase()
                    .contains(&needle.to_lowercase()),
                _ => false,
            },
            (FilterOp::In, Some(actual)) => match &self.value {
                FilterValue::List(items) => items.iter().any(|item| equals(actual, item)),
                _ => false,
            },
            (FilterOp::NotIn, Some(actual)) => match &self.value {
                FilterValue::List(items) => !items.iter().any(|item| equals(actual, item)),
                _ => false,
            },
        }
    }
}

/// A filter expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    /// A single field condition.
    Field(FilterField),
    /// All children must match; empty matches everything.
    And(Vec<Filter>),
    /// Any child must match; empty matches nothing.
    Or(Vec<Filter>),
}

impl Filter {
    /// A filter matching every record.
    pub fn all() -> Self {
        Self::And(Vec::new())
    }

    /// `field == value` (`IsNull` when `value` is null).
    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::Field(FilterField::new(field, FilterOp::Eq, value))
    }

    /// `field != value`; null fields never match.
    pub fn ne(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::Field(FilterField::new(field, FilterOp::Ne, value))
    }

    /// `field > value`.
    pub fn gt(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::Field(FilterField::new(field, FilterOp::Gt, value))
    }

    /// `field >= value`.
    pub fn gte(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::Field(FilterField::new(field, FilterOp::Gte, value))
    }

    /// `field < value`.
    pub fn lt(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::Field(FilterField::new(field, FilterOp::Lt, value))
    }

    /// `field <= value`.
    pub fn lte(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::Field(FilterField::new(field, FilterOp::Lte, value))
    }

    /// Case-insensitive substring match.
    pub fn contains(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::Field(FilterField::new(field, FilterOp::Contains, needle.into()))
    }

    /// `field IN values`.
    pub fn in_list<V: Into<FilterValue>>(field: impl Into<String>, values: Vec<V>) -> Self {
        Self::Field(FilterField::new(field, FilterOp::In, values))
    }

    /// `field NOT IN values`; null fields never match.
    pub fn not_in<V: Into<FilterValue>>(field: impl Into<String>, values: Vec<V>) -> Self {
        Self::Field(FilterField::new(field, FilterOp::NotIn, values))
    }

    /// Field is null or missing.
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::Field(FilterField::new(field, FilterOp::IsNull, FilterValue::Null))
    }

    /// Field is present and not null.
    pub fn is_not_null(field: impl Into<String>) -> Self {
        Self::Field(FilterField::new(field, FilterOp::IsNotNull, FilterValue::Null))
    }

    /// Conjunction of `self` and `other`, flattening nested `And`s.
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Self::And(mut left), Self::And(right)) => {
                left.extend(right);
                Self::And(left)
            }
            (Self::And(mut left), other) => {
                left.push(other);
                Self::And(left)
            }
            (this, Self::And(mut right)) => {
                right.insert(0, this);
                Self::And(right)
            }
            (this, other) => Self::And(vec![this, other]),
        }
    }

    /// Disjunction of `self` and `other`.
    pub fn or(self, other: Filter) -> Self {
        match self {
            Self::Or(mut left) => {
                left.push(other);
                Self::Or(left)
            }
            this => Self::Or(vec![this, other]),
        }
    }

    /// Validate every field against the schema and canonicalize values.
    ///
    /// Adapters only ever see normalized filters.
    pub fn normalize(self, schema: &EntitySchema) -> AppResult<Filter> {
        match self {
            Self::Field(field) => field.normalize(schema).map(Self::Field),
            Self::And(children) => children
                .into_iter()
                .map(|c| c.normalize(schema))
                .collect::<AppResult<Vec<_>>>()
                .map(Self::And),
            Self::Or(children) => children
                .into_iter()
                .map(|c| c.normalize(schema))
                .collect::<AppResult<Vec<_>>>()
                .map(Self::Or),
        }
    }

    /// Evaluate the filter against a record.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::Field(field) => field.matches(record),
            Self::And(children) => children.iter().all(|c| c.matches(record)),
            Self::Or(children) => children.iter().any(|c| c.matches(record)),
        }
    }
}

/// Compare two stored JSON scalars.
///
/// Numbers compare numerically, strings lexically and booleans with
/// `false < true`. Mixed or non-scalar values are incomparable.
pub fn compare_json(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Format a timestamp the way every engine stores it.
///
/// Fixed-width UTC with nanoseconds, so text ordering equals time ordering.
pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parse any RFC 3339 timestamp and re-format it canonically.
pub fn canonical_timestamp(value: &str) -> Result<String, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|dt| format_timestamp(&dt.with_timezone(&Utc)))
}

fn equals(actual: &Value, expected: &FilterValue) -> bool {
    compare(actual, expected) == Some(Ordering::Equal)
}

fn compare(actual: &Value, expected: &FilterValue) -> Option<Ordering> {
    compare_json(actual, &expected.to_json())
}
