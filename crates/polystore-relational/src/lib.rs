//! # polystore-relational
//!
//! One SQL adapter shared by every relational engine. The adapter builds
//! dialect-aware statements and runs them through a [`SqlContext`]:
//!
//! - [`AnyContext`]: sqlx `Any` pool for SQLite, PostgreSQL and MySQL
//! - [`MssqlContext`]: a single tiberius connection for SQL Server

pub mod adapter;
pub mod backend;
pub mod configurator;
pub mod connection;
pub mod context;
pub mod dialect;
pub mod statement;
pub mod value;

pub use adapter::{SqlAdapter, SqlTransactionAdapter};
pub use backend::SqlBackend;
pub use configurator::{
    MySqlConfigurator, PostgresConfigurator, SqlServerConfigurator, SqliteConfigurator,
};
pub use context::any::AnyContext;
pub use context::mssql::MssqlContext;
pub use context::{SqlContext, SqlExecutor, SqlSession};
pub use dialect::SqlDialect;
pub use statement::{SqlTable, Statement};
pub use value::SqlValue;
