//! Document-store provider settings.

use serde::{Deserialize, Serialize};

/// MongoDB provider settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MongoDbSettings {
    /// MongoDB connection URI (`mongodb://host:27017`).
    pub connection_string: Option<String>,
    /// Database holding the entity collections.
    pub database_name: Option<String>,
    /// Server selection / connect timeout in seconds.
    pub connect_timeout_seconds: Option<u64>,
    /// Maximum connections held by the driver pool.
    pub max_pool_size: Option<u32>,
}

/// Embedded document store settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiteDbSettings {
    /// Directory holding one JSON file per collection, or `":memory:"`.
    pub connection_string: Option<String>,
}

/// Sentinel location for a non-persistent database (embedded store or SQLite).
pub const IN_MEMORY: &str = ":memory:";
