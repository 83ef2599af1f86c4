use crate::{ErrorCodes, ScalerError};
use thiserror::Error;

/// Implements `ScalerError` for `sqlx::Error`.
#[derive(Debug, Error)]
#[error("Database error: {0}")]
pub struct WrappedSqlxError(#[from] pub sqlx::Error);

impl ScalerError for WrappedSqlxError {
    fn code(&self) -> ErrorCodes {
        match self.0 {
            sqlx::Error::RowNotFound => ErrorCodes::NotFound,
            sqlx::Error::PoolTimedOut => ErrorCodes::ResourceExhausted,
            sqlx::Error::PoolClosed => ErrorCodes::Unavailable,
            sqlx::Error::Configuration(_) => ErrorCodes::InvalidArgument,
            _ => ErrorCodes::Internal,
        }
    }
}
