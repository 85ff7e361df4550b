//! MongoDB provider.
//!
//! Documents keep the entity's JSON shape with `_id` set to the entity id.
//! Transactions use client sessions and need a replica set.

pub mod adapter;
pub mod backend;
mod convert;

pub use adapter::{MongoAdapter, MongoTransaction};
pub use backend::{MongoBackend, MongoConfigurator};
