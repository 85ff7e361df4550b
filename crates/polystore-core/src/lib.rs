//! # polystore-core
//!
//! Core crate for polystore. Contains the entity capability traits, entity
//! schemas, repository and storage traits, the query model
//! (filter / sort / page / field updates), configuration schemas and the
//! unified error system.
//!
//! This crate has **no** dependency on any storage engine.

pub mod config;
pub mod entity;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;
