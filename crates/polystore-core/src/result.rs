//! Convenience result type alias for polystore.

use crate::error::AppError;

/// A specialized `Result` type for repository and adapter operations.
pub type AppResult<T> = Result<T, AppError>;
