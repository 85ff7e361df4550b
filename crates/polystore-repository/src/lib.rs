//! # polystore-repository
//!
//! The typed layer over the storage adapters:
//!
//! - [`AdapterRepository`]: identifiers, audit stamps, soft-delete
//!   visibility, validation and paging, identical on every engine
//! - [`RepositoryFactory`]: the handle callers hold, delegating to the
//!   selected repository with optional cancellation
//! - [`ProviderRegistry`]: provider name to configurator lookup
//! - [`DataAccess`]: validate, connect once, hand out repositories

pub mod adapter_repository;
pub mod data_access;
pub mod factory;
pub mod registry;

pub use adapter_repository::AdapterRepository;
pub use data_access::DataAccess;
pub use factory::RepositoryFactory;
pub use registry::ProviderRegistry;
