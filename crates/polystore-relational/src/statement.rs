//! Dialect-aware statement building for one entity table.

use polystore_core::entity::{Column, EntitySchema, Record, fields};
use polystore_core::error::AppError;
use polystore_core::result::AppResult;
use polystore_core::traits::storage::StoreQuery;
use polystore_core::types::filter::{Filter, FilterField, FilterOp, FilterValue};
use polystore_core::types::update::FieldUpdates;
use uuid::Uuid;

use crate::dialect::SqlDialect;
use crate::value::{SqlValue, record_values};

/// Parameters kept free in an id lookup for the soft-delete flag and similar.
const RESERVED_PARAMETERS: usize = 16;

/// SQL text plus its bound parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// SQL text using the dialect's placeholders.
    pub sql: String,
    /// Parameters, in placeholder order.
    pub params: Vec<SqlValue>,
}

impl Statement {
    /// A statement without parameters.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }
}

/// Accumulates SQL text and numbers placeholders as parameters are pushed.
struct SqlWriter {
    dialect: SqlDialect,
    sql: String,
    params: Vec<SqlValue>,
}

impl SqlWriter {
    fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    fn bind(&mut self, value: SqlValue) {
        self.params.push(value);
        let placeholder = self.dialect.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
    }

    fn bind_list(&mut self, values: impl IntoIterator<Item = SqlValue>) {
        for (i, value) in values.into_iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.bind(value);
        }
    }

    fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

/// Statement factory for one entity table.
#[derive(Debug, Clone)]
pub struct SqlTable {
    dialect: SqlDialect,
    /// Unquoted table name.
    name: String,
    /// Quoted, possibly schema-qualified table name.
    qualified: String,
    /// Unquoted `schema.table` used in SQL Server catalog lookups.
    object_name: String,
    schema: &'static EntitySchema,
    /// Quoted column list in schema order.
    column_list: String,
}

impl SqlTable {
    /// Describe `schema` stored in `name`, optionally inside a database schema.
    pub fn new(
        dialect: SqlDialect,
        db_schema: Option<&str>,
        name: impl Into<String>,
        schema: &'static EntitySchema,
    ) -> Self {
        let name = name.into();
        let column_list = schema
            .columns()
            .iter()
            .map(|c| dialect.quote(c.name))
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            dialect,
            qualified: dialect.qualified(db_schema, &name),
            object_name: match db_schema {
                Some(s) => format!("{s}.{name}"),
                None => name.clone(),
            },
            name,
            schema,
            column_list,
        }
    }

    /// The dialect statements are written in.
    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Unquoted table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The stored entity schema.
    pub fn schema(&self) -> &'static EntitySchema {
        self.schema
    }

    /// Columns in select order.
    pub fn columns(&self) -> &[Column] {
        self.schema.columns()
    }

    /// Most records a single multi-row insert may carry.
    pub fn rows_per_insert(&self) -> usize {
        let per_params = self.dialect.max_parameters() / self.columns().len().max(1);
        per_params.min(self.dialect.max_rows_per_insert()).max(1)
    }

    /// Most identifiers a single `IN` list may carry, leaving room for the
    /// other parameters of the statement.
    pub fn ids_per_statement(&self) -> usize {
        self.dialect
            .max_parameters()
            .saturating_sub(RESERVED_PARAMETERS)
            .max(1)
    }

    /// Create the table and its primary key if missing.
    pub fn create_table(&self) -> Statement {
        let id = fields::ID;
        let definitions = self
            .columns()
            .iter()
            .map(|column| {
                let null = if column.name == id || !column.nullable {
                    "NOT NULL"
                } else {
                    "NULL"
                };
                format!(
                    "{} {} {null}",
                    self.dialect.quote(column.name),
                    self.dialect.column_type(column.column_type)
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        let body = format!(
            "{} ({definitions}, PRIMARY KEY ({}))",
            self.qualified,
            self.dialect.quote(id)
        );

        let sql = match self.dialect {
            SqlDialect::SqlServer => format!(
                "IF OBJECT_ID(N'{}', N'U') IS NULL CREATE TABLE {body}",
                self.object_name.replace('\'', "''")
            ),
            SqlDialect::MySql => {
                format!("CREATE TABLE IF NOT EXISTS {body} DEFAULT CHARSET=utf8mb4")
            }
            SqlDialect::Sqlite | SqlDialect::Postgres => {
                format!("CREATE TABLE IF NOT EXISTS {body}")
            }
        };
        Statement::raw(sql)
    }

    /// Insert `records` with one `VALUES` row each.
    pub fn insert(&self, records: &[Record]) -> AppResult<Statement> {
        if records.is_empty() {
            return Err(AppError::internal("Cannot build an insert without rows"));
        }
        let mut w = SqlWriter::new(self.dialect);
        w.push(&format!(
            "INSERT INTO {} ({}) VALUES ",
            self.qualified, self.column_list
        ));
        for (i, record) in records.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.push("(");
            w.bind_list(record_values(self.columns(), record)?);
            w.push(")");
        }
        Ok(w.finish())
    }

    /// Overwrite every non-id column of the row with the record's id.
    pub fn replace(&self, id: Uuid, record: &Record) -> AppResult<Statement> {
        let values = record_values(self.columns(), record)?;
        let mut w = SqlWriter::new(self.dialect);
        w.push(&format!("UPDATE {} SET ", self.qualified));
        let mut first = true;
        for (column, value) in self.columns().iter().zip(values) {
            if column.name == fields::ID {
                continue;
            }
            if !first {
                w.push(", ");
            }
            first = false;
            w.push(&format!("{} = ", self.dialect.quote(column.name)));
            w.bind(value);
        }
        w.push(&format!(" WHERE {} = ", self.dialect.quote(fields::ID)));
        w.bind(SqlValue::Text(id.to_string()));
        Ok(w.finish())
    }

    /// Select columns in schema order.
    pub fn select(&self, query: &StoreQuery) -> AppResult<Statement> {
        let mut w = SqlWriter::new(self.dialect);
        w.push(&format!("SELECT {} FROM {}", self.column_list, self.qualified));
        self.push_where(&mut w, query.filter.as_ref())?;

        let window = self.dialect.window(query.skip, query.limit);
        if !query.sort.is_empty() {
            let terms = query
                .sort
                .iter()
                .map(|key| {
                    self.schema.require_column(&key.field)?;
                    Ok(self
                        .dialect
                        .order_term(&self.dialect.quote(&key.field), key.direction))
                })
                .collect::<AppResult<Vec<_>>>()?;
            w.push(&format!(" ORDER BY {}", terms.join(", ")));
        } else if window.is_some() && self.dialect == SqlDialect::SqlServer {
            w.push(" ORDER BY (SELECT NULL)");
        }
        if let Some(window) = window {
            w.push(" ");
            w.push(&window);
        }
        Ok(w.finish())
    }

    /// Count rows matching `filter`.
    pub fn count(&self, filter: Option<&Filter>) -> AppResult<Statement> {
        let mut w = SqlWriter::new(self.dialect);
        w.push(&format!(
            "SELECT {} FROM {}",
            self.dialect.count_expression(),
            self.qualified
        ));
        self.push_where(&mut w, filter)?;
        Ok(w.finish())
    }

    /// Delete rows by identifier.
    pub fn delete(&self, ids: &[Uuid]) -> Statement {
        let mut w = SqlWriter::new(self.dialect);
        w.push(&format!(
            "DELETE FROM {} WHERE {} IN (",
            self.qualified,
            self.dialect.quote(fields::ID)
        ));
        w.bind_list(ids.iter().map(|id| SqlValue::Text(id.to_string())));
        w.push(")");
        w.finish()
    }

    /// Set `updates` on every row matching `filter`.
    pub fn update_fields(
        &self,
        filter: Option<&Filter>,
        updates: &FieldUpdates,
    ) -> AppResult<Statement> {
        if updates.is_empty() {
            return Err(AppError::internal("Cannot build an update without assignments"));
        }
        let mut w = SqlWriter::new(self.dialect);
        w.push(&format!("UPDATE {} SET ", self.qualified));
        for (i, assignment) in updates.assignments().iter().enumerate() {
            let column = self.schema.require_column(&assignment.field)?;
            if i > 0 {
                w.push(", ");
            }
            w.push(&format!("{} = ", self.dialect.quote(column.name)));
            w.bind(SqlValue::from_filter(&assignment.value, column.column_type)?);
        }
        self.push_where(&mut w, filter)?;
        Ok(w.finish())
    }

    fn push_where(&self, w: &mut SqlWriter, filter: Option<&Filter>) -> AppResult<()> {
        match filter {
            None => Ok(()),
            Some(Filter::And(children)) if children.is_empty() => Ok(()),
            Some(filter) => {
                w.push(" WHERE ");
                self.push_filter(w, filter)
            }
        }
    }

    fn push_filter(&self, w: &mut SqlWriter, filter: &Filter) -> AppResult<()> {
        match filter {
            Filter::Field(field) => self.push_condition(w, field),
            Filter::And(children) if children.is_empty() => {
                w.push("1=1");
                Ok(())
            }
            Filter::Or(children) if children.is_empty() => {
                w.push("1=0");
                Ok(())
            }
            Filter::And(children) => self.push_group(w, children, " AND "),
            Filter::Or(children) => self.push_group(w, children, " OR "),
        }
    }

    fn push_group(&self, w: &mut SqlWriter, children: &[Filter], joiner: &str) -> AppResult<()> {
        w.push("(");
        for (i, child) in children.iter().enumerate() {
            if i > 0 {
                w.push(joiner);
            }
            self.push_filter(w, child)?;
        }
        w.push(")");
        Ok(())
    }

    fn push_condition(&self, w: &mut SqlWriter, field: &FilterField) -> AppResult<()> {
        let column = self.schema.require_column(&field.field)?;
        let name = self.dialect.quote(column.name);
        let scalar = |value: &FilterValue| SqlValue::from_filter(value, column.column_type);

        let comparison = match field.op {
            FilterOp::Eq if field.value.is_null() => return push_text(w, &format!("{name} IS NULL")),
            FilterOp::Ne if field.value.is_null() => {
                return push_text(w, &format!("{name} IS NOT NULL"));
            }
            FilterOp::IsNull => return push_text(w, &format!("{name} IS NULL")),
            FilterOp::IsNotNull => return push_text(w, &format!("{name} IS NOT NULL")),
            FilterOp::Eq => "=",
            FilterOp::Ne => "<>",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
            FilterOp::Contains => {
                let FilterValue::String(needle) = &field.value else {
                    return Err(AppError::validation(format!(
                        "Contains on '{}' needs a string value",
                        field.field
                    )));
                };
                let pattern = format!("%{}%", self.dialect.escape_like(needle));
                w.push(&format!("LOWER({name}) LIKE LOWER("));
                w.bind(SqlValue::Text(pattern));
                w.push(&format!(") ESCAPE '{}'", self.dialect.like_escape()));
                return Ok(());
            }
            FilterOp::In | FilterOp::NotIn => {
                let items = match &field.value {
                    FilterValue::List(items) => items.as_slice(),
                    other => std::slice::from_ref(other),
                };
                let negated = field.op == FilterOp::NotIn;
                if items.is_empty() {
                    let text = if negated {
                        format!("{name} IS NOT NULL")
                    } else {
                        "1=0".to_string()
                    };
                    return push_text(w, &text);
                }
                let values = items.iter().map(scalar).collect::<AppResult<Vec<_>>>()?;
                w.push(&format!("{name} {} (", if negated { "NOT IN" } else { "IN" }));
                w.bind_list(values);
                w.push(")");
                return Ok(());
            }
        };

        w.push(&format!("{name} {comparison} "));
        w.bind(scalar(&field.value)?);
        Ok(())
    }
}

fn push_text(w: &mut SqlWriter, text: &str) -> AppResult<()> {
    w.push(text);
    Ok(())
}
