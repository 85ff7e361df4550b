//! Typed builder for set-based partial updates.

use serde::{Deserialize, Serialize};

use crate::entity::{ColumnType, EntitySchema, fields};
use crate::error::AppError;
use crate::result::AppResult;

use super::filter::FilterValue;

/// Fields that partial updates may never touch.
const PROTECTED_FIELDS: &[&str] = &[
    fields::ID,
    fields::CREATED_DATE,
    fields::CREATED_BY,
    fields::IS_DELETED,
    fields::DELETED_DATE,
    fields::DELETED_BY,
];

/// One `field = value` assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldAssignment {
    /// Target field.
    pub field: String,
    /// New value.
    pub value: FilterValue,
}

/// Ordered set of field assignments for `update_many_with_fields`.
///
/// ```ignore
/// let updates = FieldUpdates::new()
///     .set("status", "archived")
///     .set("views", 0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldUpdates {
    assignments: Vec<FieldAssignment>,
}

impl FieldUpdates {
    /// Create an empty update set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `value` to `field`. A later assignment to the same field wins.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        let field = field.into();
        let value = value.into();
        match self.assignments.iter_mut().find(|a| a.field == field) {
            Some(existing) => existing.value = value,
            None => self.assignments.push(FieldAssignment { field, value }),
        }
        self
    }

    /// Whether no field is assigned.
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// The assignments in insertion order.
    pub fn assignments(&self) -> &[FieldAssignment] {
        &self.assignments
    }

    /// Validate against the schema and canonicalize every value.
    ///
    /// Rejects unknown fields, protected fields, nulls on non-nullable
    /// columns and values of the wrong type.
    pub fn normalize(self, schema: &EntitySchema) -> AppResult<FieldUpdates> {
        let assignments = self
            .assignments
            .into_iter()
            .map(|assignment| {
                if PROTECTED_FIELDS.contains(&assignment.field.as_str()) {
                    return Err(AppError::validation(format!(
                        "Field '{}' cannot be changed by a partial update",
                        assignment.field
                    )));
                }
                let column = schema.require_column(&assignment.field)?;
                if assignment.value.is_null() && !column.nullable {
                    return Err(AppError::validation(format!(
                        "Field '{}' is not nullable",
                        assignment.field
                    )));
                }
                if matches!(assignment.value, FilterValue::List(_))
                    && column.column_type != ColumnType::Json
                {
                    return Err(AppError::validation(format!(
                        "Field '{}' cannot hold a list",
                        assignment.field
                    )));
                }
                let value = assignment.value.conform(&assignment.field, column.column_type)?;
                Ok(FieldAssignment {
                    field: assignment.field,
                    value,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;
        Ok(FieldUpdates { assignments })
    }
}
