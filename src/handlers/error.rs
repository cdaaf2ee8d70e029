//! Handler error types.

use thiserror::Error;

use crate::db::DbError;

#[derive(Debug, Error)]
pub enum HandlerError {
    /// Malformed or unexpected payload.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(#[from] DbError),

    /// Cache and store disagree, or the store returned something the
    /// handler cannot account for.
    #[error("Consistency error: {0}")]
    Consistency(String),
}

impl HandlerError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn consistency(message: impl Into<String>) -> Self {
        Self::Consistency(message.into())
    }
}
