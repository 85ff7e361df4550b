//! Explicit audit context passed to mutating operations.

use serde::{Deserialize, Serialize};

/// Actor used when no user is attached to the operation.
pub const SYSTEM_ACTOR: &str = "system";

/// Who performs a mutating operation.
///
/// Stamped into `created_by`, `last_modified_by` and `deleted_by`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    /// Actor identifier (user name, service name, ...).
    pub actor: String,
}

impl AuditContext {
    /// Create a context for the given actor.
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
        }
    }

    /// Context for background work with no user attached.
    pub fn system() -> Self {
        Self::new(SYSTEM_ACTOR)
    }
}

impl Default for AuditContext {
    fn default() -> Self {
        Self::system()
    }
}
