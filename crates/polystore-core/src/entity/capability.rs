//! Entity capability traits.
//!
//! An entity always has an identifier. Auditing and soft deletion are
//! optional, independent facets: the repository asks the entity for each
//! facet at runtime through the hooks on [`Entity`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::schema::EntitySchema;

/// Field names used by the built-in capabilities.
pub mod fields {
    /// Identifier field.
    pub const ID: &str = "id";
    /// Creation timestamp.
    pub const CREATED_DATE: &str = "created_date";
    /// Creating actor.
    pub const CREATED_BY: &str = "created_by";
    /// Last modification timestamp.
    pub const LAST_MODIFIED_DATE: &str = "last_modified_date";
    /// Last modifying actor.
    pub const LAST_MODIFIED_BY: &str = "last_modified_by";
    /// Soft-delete flag.
    pub const IS_DELETED: &str = "is_deleted";
    /// Soft-delete timestamp.
    pub const DELETED_DATE: &str = "deleted_date";
    /// Soft-deleting actor.
    pub const DELETED_BY: &str = "deleted_by";
}

/// A persistable entity with a UUID identifier.
///
/// A nil identifier means "not yet persisted"; the repository assigns one on
/// create. Override the capability hooks to opt into auditing or soft
/// deletion, and declare the matching columns on the schema.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Column layout and capability flags for this entity type.
    fn schema() -> &'static EntitySchema;

    /// The entity identifier.
    fn id(&self) -> Uuid;

    /// Replace the entity identifier.
    fn set_id(&mut self, id: Uuid);

    /// Audit facet, if the entity carries one.
    fn as_auditable(&self) -> Option<&dyn Auditable> {
        None
    }

    /// Mutable audit facet, if the entity carries one.
    fn as_auditable_mut(&mut self) -> Option<&mut dyn Auditable> {
        None
    }

    /// Soft-delete facet, if the entity carries one.
    fn as_soft_deletable(&self) -> Option<&dyn SoftDeletable> {
        None
    }

    /// Mutable soft-delete facet, if the entity carries one.
    fn as_soft_deletable_mut(&mut self) -> Option<&mut dyn SoftDeletable> {
        None
    }
}

/// Creation and modification metadata, meant to be `#[serde(flatten)]`-ed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStamp {
    /// Set once, when the entity is first persisted.
    #[serde(default)]
    pub created_date: Option<DateTime<Utc>>,
    /// Actor that created the entity.
    #[serde(default)]
    pub created_by: Option<String>,
    /// `None` means never modified.
    #[serde(default)]
    pub last_modified_date: Option<DateTime<Utc>>,
    /// Actor that last modified the entity.
    #[serde(default)]
    pub last_modified_by: Option<String>,
}

/// Entities carrying an [`AuditStamp`].
pub trait Auditable {
    /// Read the audit metadata.
    fn audit(&self) -> &AuditStamp;

    /// Mutate the audit metadata.
    fn audit_mut(&mut self) -> &mut AuditStamp;
}

/// Soft-delete metadata, meant to be `#[serde(flatten)]`-ed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftDeleteStamp {
    /// Whether the entity is logically deleted.
    #[serde(default)]
    pub is_deleted: bool,
    /// When the entity was soft-deleted.
    #[serde(default)]
    pub deleted_date: Option<DateTime<Utc>>,
    /// Actor that soft-deleted the entity.
    #[serde(default)]
    pub deleted_by: Option<String>,
}

impl SoftDeleteStamp {
    /// Mark as deleted by `actor` at `at`.
    pub fn mark_deleted(&mut self, actor: &str, at: DateTime<Utc>) {
        self.is_deleted = true;
        self.deleted_date = Some(at);
        self.deleted_by = Some(actor.to_string());
    }

    /// Clear all deletion metadata.
    pub fn clear(&mut self) {
        self.is_deleted = false;
        self.deleted_date = None;
        self.deleted_by = None;
    }
}

/// Entities carrying a [`SoftDeleteStamp`].
pub trait SoftDeletable {
    /// Read the soft-delete metadata.
    fn deletion(&self) -> &SoftDeleteStamp;

    /// Mutate the soft-delete metadata.
    fn deletion_mut(&mut self) -> &mut SoftDeleteStamp;

    /// Whether the entity is logically deleted.
    fn is_deleted(&self) -> bool {
        self.deletion().is_deleted
    }
}
