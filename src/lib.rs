//! # polystore
//!
//! Provider-agnostic entity repositories. One configuration call selects the
//! engine (MongoDB, the embedded document store, SQLite, SQL Server, MySQL or
//! PostgreSQL); every entity type then gets the same repository contract with
//! identical observable results on each engine.
//!
//! ```no_run
//! use polystore::prelude::*;
//!
//! # async fn run() -> AppResult<()> {
//! let mut options = RepositoryOptions::new("SQLite");
//! options.sqlite.database_path = Some("data/app.db".to_string());
//! let access = DataAccess::connect(options).await?;
//! # let _ = access;
//! # Ok(())
//! # }
//! ```

pub use polystore_core;
pub use polystore_document;
pub use polystore_relational;
pub use polystore_repository;

pub use polystore_core::{AppError, AppResult, ErrorKind};
pub use polystore_repository::{AdapterRepository, DataAccess, ProviderRegistry, RepositoryFactory};

/// Everything needed to declare entities and use repositories.
pub mod prelude {
    pub use polystore_core::config::RepositoryOptions;
    pub use polystore_core::config::naming::{NameCasing, NamingOptions};
    pub use polystore_core::entity::{
        AuditStamp, Auditable, ColumnType, Entity, EntitySchema, SoftDeletable, SoftDeleteStamp,
    };
    pub use polystore_core::traits::repository::{
        EnhancedEntityRepository, EntityRepository, TransactionWork, transaction_work,
    };
    pub use polystore_core::types::{
        AuditContext, FieldUpdates, Filter, PageRequest, PagedResult, QueryParameters,
        SortDirection, SortField,
    };
    pub use polystore_core::{AppError, AppResult, ErrorKind};
    pub use polystore_repository::{DataAccess, RepositoryFactory};
}
