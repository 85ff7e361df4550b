//! Embedded, file-backed document store (the LiteDB provider).

pub mod adapter;
pub mod backend;
pub mod engine;
mod ops;

pub use adapter::{EmbeddedAdapter, EmbeddedTransaction};
pub use backend::{EmbeddedBackend, EmbeddedConfigurator};
pub use engine::EmbeddedDatabase;
