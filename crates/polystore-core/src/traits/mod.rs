//! Core traits defined in `polystore-core` and implemented by other crates.

pub mod provider;
pub mod repository;
pub mod storage;

pub use provider::ProviderConfigurator;
pub use repository::{EnhancedEntityRepository, EntityRepository, TransactionWork, transaction_work};
pub use storage::{AdapterTransaction, StorageAdapter, StorageBackend, StoreQuery};
