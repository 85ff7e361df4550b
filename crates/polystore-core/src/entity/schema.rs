//! Entity schemas.
//!
//! A schema lists the serialized fields of an entity with a storage type.
//! Relational adapters derive their table layout from it, and every adapter
//! uses it as the whitelist for filter, sort and update field names.

use std::fmt;

use crate::error::AppError;
use crate::result::AppResult;

use super::capability::fields;

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// UUID stored in its hyphenated text form.
    Uuid,
    /// Free text.
    Text,
    /// 64-bit signed integer.
    Integer,
    /// 64-bit float.
    Float,
    /// Boolean.
    Boolean,
    /// RFC 3339 timestamp stored as text.
    Timestamp,
    /// Arbitrary JSON (arrays, nested objects) stored as text.
    Json,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uuid => "uuid",
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Json => "json",
        };
        f.write_str(name)
    }
}

/// A single column of an entity schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Serialized field name, also used as column / document key.
    pub name: &'static str,
    /// Storage type.
    pub column_type: ColumnType,
    /// Whether the column accepts null.
    pub nullable: bool,
}

/// Column layout and capability flags of an entity type.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    name: &'static str,
    columns: Vec<Column>,
    auditable: bool,
    soft_deletable: bool,
}

impl EntitySchema {
    /// Start a schema for the entity type `name`. The `id` column is added
    /// automatically.
    pub fn builder(name: &'static str) -> EntitySchemaBuilder {
        EntitySchemaBuilder {
            schema: EntitySchema {
                name,
                columns: vec![Column {
                    name: fields::ID,
                    column_type: ColumnType::Uuid,
                    nullable: false,
                }],
                auditable: false,
                soft_deletable: false,
            },
        }
    }

    /// Entity type name, the input to table / collection naming.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Columns in declaration order, `id` first.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Look up a column by field name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Look up a column, failing with a validation error for unknown names.
    pub fn require_column(&self, name: &str) -> AppResult<&Column> {
        self.column(name).ok_or_else(|| {
            AppError::validation(format!(
                "Unknown field '{name}' for entity '{}'",
                self.name
            ))
        })
    }

    /// Whether the entity carries audit fields.
    pub fn is_auditable(&self) -> bool {
        self.auditable
    }

    /// Whether the entity carries soft-delete fields.
    pub fn is_soft_deletable(&self) -> bool {
        self.soft_deletable
    }
}

/// Builder for [`EntitySchema`].
#[derive(Debug)]
pub struct EntitySchemaBuilder {
    schema: EntitySchema,
}

impl EntitySchemaBuilder {
    /// Add a non-nullable column. Redeclaring a name replaces the column.
    pub fn column(self, name: &'static str, column_type: ColumnType) -> Self {
        self.push(name, column_type, false)
    }

    /// Add a nullable column.
    pub fn nullable(self, name: &'static str, column_type: ColumnType) -> Self {
        self.push(name, column_type, true)
    }

    /// Declare the audit columns and mark the entity auditable.
    pub fn auditable(mut self) -> Self {
        self.schema.auditable = true;
        self.push(fields::CREATED_DATE, ColumnType::Timestamp, true)
            .push(fields::CREATED_BY, ColumnType::Text, true)
            .push(fields::LAST_MODIFIED_DATE, ColumnType::Timestamp, true)
            .push(fields::LAST_MODIFIED_BY, ColumnType::Text, true)
    }

    /// Declare the soft-delete columns and mark the entity soft-deletable.
    pub fn soft_deletable(mut self) -> Self {
        self.schema.soft_deletable = true;
        self.push(fields::IS_DELETED, ColumnType::Boolean, false)
            .push(fields::DELETED_DATE, ColumnType::Timestamp, true)
            .push(fields::DELETED_BY, ColumnType::Text, true)
    }

    /// Finish the schema.
    pub fn build(self) -> EntitySchema {
        self.schema
    }

    fn push(mut self, name: &'static str, column_type: ColumnType, nullable: bool) -> Self {
        let column = Column {
            name,
            column_type,
            nullable,
        };
        match self.schema.columns.iter_mut().find(|c| c.name == name) {
            Some(existing) => *existing = column,
            None => self.schema.columns.push(column),
        }
        self
    }
}
