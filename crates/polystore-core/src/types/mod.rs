//! Query model shared by every repository and adapter.

pub mod audit;
pub mod filter;
pub mod pagination;
pub mod query;
pub mod sorting;
pub mod update;

pub use audit::AuditContext;
pub use filter::{Filter, FilterField, FilterOp, FilterValue};
pub use pagination::{PageRequest, PagedResult};
pub use query::QueryParameters;
pub use sorting::{SortDirection, SortField};
pub use update::{FieldAssignment, FieldUpdates};
