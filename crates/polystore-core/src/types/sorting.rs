//! Sorting types for ordered queries.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::entity::{ColumnType, EntitySchema, Record};
use crate::error::AppError;
use crate::result::AppResult;

use super::filter::compare_json;

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending order, nulls first.
    #[default]
    Asc,
    /// Descending order, nulls last.
    Desc,
}

impl SortDirection {
    /// Return the SQL keyword for this direction.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    /// Return the MongoDB sort value for this direction.
    pub fn as_mongo(&self) -> i32 {
        match self {
            Self::Asc => 1,
            Self::Desc => -1,
        }
    }
}

/// A sort key: a field name and a direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    /// Field name to sort by.
    pub field: String,
    /// Sort direction.
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortField {
    /// Create a new sort field.
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    /// Create an ascending sort on the given field.
    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Asc)
    }

    /// Create a descending sort on the given field.
    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Desc)
    }
}

/// Check every sort key against the schema.
///
/// An empty list is allowed for the unsorted operations; callers of the
/// sorted operations use [`require_sort`].
pub fn validate_sort(sort: &[SortField], schema: &EntitySchema) -> AppResult<()> {
    for key in sort {
        if key.field.trim().is_empty() {
            return Err(AppError::validation("Sort field name must not be empty"));
        }
        let column = schema.require_column(&key.field)?;
        if column.column_type == ColumnType::Json {
            return Err(AppError::validation(format!(
                "Field '{}' stores JSON and cannot be sorted on",
                key.field
            )));
        }
    }
    Ok(())
}

/// Like [`validate_sort`], but the list must hold at least one key.
pub fn require_sort(sort: &[SortField], schema: &EntitySchema) -> AppResult<()> {
    if sort.is_empty() {
        return Err(AppError::validation("At least one sort field is required"));
    }
    validate_sort(sort, schema)
}

/// Order two records by `sort`, treating null and missing fields as the
/// smallest value.
pub fn compare_records(left: &Record, right: &Record, sort: &[SortField]) -> Ordering {
    for key in sort {
        let a = left.get(&key.field).filter(|v| !v.is_null());
        let b = right.get(&key.field).filter(|v| !v.is_null());
        let ordering = match (a, b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => compare_json(a, b).unwrap_or(Ordering::Equal),
        };
        let ordering = match key.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}
