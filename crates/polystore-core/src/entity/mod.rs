//! Entity capabilities, schemas and record conversion.

pub mod capability;
pub mod record;
pub mod schema;

pub use capability::{AuditStamp, Auditable, Entity, SoftDeletable, SoftDeleteStamp, fields};
pub use record::{Record, from_record, record_id, to_record};
pub use schema::{Column, ColumnType, EntitySchema, EntitySchemaBuilder};
