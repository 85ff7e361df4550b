//! # polystore-document
//!
//! Document-store providers for polystore:
//!
//! - **MongoDB**: async adapter over the official `mongodb` driver
//! - **LiteDB / Embedded**: a file-backed document store holding one JSON
//!   file per collection, with a synchronous engine offloaded to the
//!   blocking thread pool
//!
//! Both keep the entity's JSON shape as the stored document.

pub mod embedded;
pub mod mongo;

pub use embedded::{EmbeddedBackend, EmbeddedConfigurator, EmbeddedDatabase};
pub use mongo::{MongoBackend, MongoConfigurator};
