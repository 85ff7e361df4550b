//! SQL dialect differences between the supported engines.

use std::fmt;

use polystore_core::entity::ColumnType;
use polystore_core::types::sorting::SortDirection;

/// The SQL flavour spoken by a relational engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlDialect {
    /// SQLite 3.
    Sqlite,
    /// PostgreSQL.
    Postgres,
    /// MySQL / MariaDB.
    MySql,
    /// Microsoft SQL Server.
    SqlServer,
}

impl SqlDialect {
    /// Quote an identifier, doubling any embedded closing quote.
    pub fn quote(&self, ident: &str) -> String {
        match self {
            Self::Sqlite | Self::Postgres => format!("\"{}\"", ident.replace('"', "\"\"")),
            Self::MySql => format!("`{}`", ident.replace('`', "``")),
            Self::SqlServer => format!("[{}]", ident.replace(']', "]]")),
        }
    }

    /// Quote a possibly schema-qualified table name.
    pub fn qualified(&self, schema: Option<&str>, table: &str) -> String {
        match schema {
            Some(schema) => format!("{}.{}", self.quote(schema), self.quote(table)),
            None => self.quote(table),
        }
    }

    /// Placeholder for the 1-based parameter `index`.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Self::Sqlite | Self::MySql => "?".to_string(),
            Self::Postgres => format!("${index}"),
            Self::SqlServer => format!("@P{index}"),
        }
    }

    /// Column definition type for a schema column.
    ///
    /// Text-like columns use a binary collation so equality and ordering
    /// agree across engines.
    pub fn column_type(&self, column_type: ColumnType) -> &'static str {
        use ColumnType as C;

        match (self, column_type) {
            (Self::Sqlite, C::Integer | C::Boolean) => "INTEGER",
            (Self::Sqlite, C::Float) => "REAL",
            (Self::Sqlite, _) => "TEXT",

            (Self::Postgres, C::Integer | C::Boolean) => "BIGINT",
            (Self::Postgres, C::Float) => "DOUBLE PRECISION",
            (Self::Postgres, C::Uuid) => "VARCHAR(36) COLLATE \"C\"",
            (Self::Postgres, C::Timestamp) => "VARCHAR(40) COLLATE \"C\"",
            (Self::Postgres, C::Text) => "TEXT COLLATE \"C\"",
            (Self::Postgres, C::Json) => "TEXT",

            (Self::MySql, C::Integer | C::Boolean) => "BIGINT",
            (Self::MySql, C::Float) => "DOUBLE",
            (Self::MySql, C::Uuid) => "VARCHAR(36) CHARACTER SET utf8mb4 COLLATE utf8mb4_bin",
            (Self::MySql, C::Timestamp) => "VARCHAR(40) CHARACTER SET utf8mb4 COLLATE utf8mb4_bin",
            (Self::MySql, C::Text) => "LONGTEXT CHARACTER SET utf8mb4 COLLATE utf8mb4_bin",
            (Self::MySql, C::Json) => "LONGTEXT CHARACTER SET utf8mb4",

            (Self::SqlServer, C::Integer) => "BIGINT",
            (Self::SqlServer, C::Boolean) => "BIT",
            (Self::SqlServer, C::Float) => "FLOAT",
            (Self::SqlServer, C::Uuid) => "NVARCHAR(36) COLLATE Latin1_General_BIN2",
            (Self::SqlServer, C::Timestamp) => "NVARCHAR(40) COLLATE Latin1_General_BIN2",
            (Self::SqlServer, C::Text) => "NVARCHAR(MAX) COLLATE Latin1_General_BIN2",
            (Self::SqlServer, C::Json) => "NVARCHAR(MAX)",
        }
    }

    /// Maximum bound parameters per statement used when chunking batches.
    pub fn max_parameters(&self) -> usize {
        match self {
            Self::Sqlite => 999,
            Self::Postgres | Self::MySql => 65_535,
            Self::SqlServer => 2_000,
        }
    }

    /// Maximum rows in one multi-row `VALUES` list.
    pub fn max_rows_per_insert(&self) -> usize {
        match self {
            Self::SqlServer => 1_000,
            _ => usize::MAX,
        }
    }

    /// Row count aggregate returning a 64-bit integer.
    pub fn count_expression(&self) -> &'static str {
        match self {
            Self::SqlServer => "COUNT_BIG(*)",
            _ => "COUNT(*)",
        }
    }

    /// One `ORDER BY` term. Nulls sort first ascending and last descending.
    pub fn order_term(&self, column: &str, direction: SortDirection) -> String {
        let keyword = direction.as_sql();
        match (self, direction) {
            (Self::Postgres, SortDirection::Asc) => format!("{column} {keyword} NULLS FIRST"),
            (Self::Postgres, SortDirection::Desc) => format!("{column} {keyword} NULLS LAST"),
            _ => format!("{column} {keyword}"),
        }
    }

    /// Row window clause appended after `ORDER BY`.
    ///
    /// SQL Server requires an `ORDER BY` before `OFFSET`; callers add one.
    pub fn window(&self, skip: Option<u64>, limit: Option<u64>) -> Option<String> {
        if skip.is_none() && limit.is_none() {
            return None;
        }
        // Engines take signed 64-bit row counts.
        let skip = clamp_rows(skip.unwrap_or(0));
        let limit = limit.map(clamp_rows);
        let clause = match (self, limit) {
            (Self::SqlServer, Some(limit)) => {
                format!("OFFSET {skip} ROWS FETCH NEXT {limit} ROWS ONLY")
            }
            (Self::SqlServer, None) => format!("OFFSET {skip} ROWS"),
            (_, Some(limit)) => format!("LIMIT {limit} OFFSET {skip}"),
            (Self::Sqlite, None) => format!("LIMIT -1 OFFSET {skip}"),
            (Self::MySql, None) => format!("LIMIT {} OFFSET {skip}", i64::MAX),
            (Self::Postgres, None) => format!("OFFSET {skip}"),
        };
        Some(clause)
    }

    /// Escape character used in `LIKE` patterns.
    pub fn like_escape(&self) -> char {
        '!'
    }

    /// Escape `LIKE` wildcards in a literal needle.
    pub fn escape_like(&self, needle: &str) -> String {
        let escape = self.like_escape();
        let mut escaped = String::with_capacity(needle.len() + 2);
        for c in needle.chars() {
            let special = c == escape
                || c == '%'
                || c == '_'
                || (c == '[' && *self == Self::SqlServer);
            if special {
                escaped.push(escape);
            }
            escaped.push(c);
        }
        escaped
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::SqlServer => "sqlserver",
        };
        write!(f, "{name}")
    }
}

fn clamp_rows(rows: u64) -> i64 {
    i64::try_from(rows).unwrap_or(i64::MAX)
}
