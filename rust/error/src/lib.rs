// Error codes mirror the gRPC status codes so that any error raised by the
// scaler can be reported to KEDA without a lossy translation step.
// https://grpc.github.io/grpc/core/md_doc_statuscodes.html
use std::error::Error;

#[cfg(feature = "tonic")]
mod tonic;
#[cfg(feature = "tonic")]
pub use tonic::*;

#[cfg(feature = "sqlx")]
mod sqlx;
#[cfg(feature = "sqlx")]
pub use sqlx::*;

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ErrorCodes {
    // "Ok" clashes with the prelude, so success is spelled out.
    Success = 0,
    Cancelled = 1,
    Unknown = 2,
    // The caller sent something we cannot work with (bad scaler metadata).
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    // Anything that went wrong on our side or in the event store.
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl ErrorCodes {
    /// Whether the failure was caused by the request rather than by the scaler.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ErrorCodes::InvalidArgument
                | ErrorCodes::NotFound
                | ErrorCodes::AlreadyExists
                | ErrorCodes::PermissionDenied
                | ErrorCodes::FailedPrecondition
                | ErrorCodes::OutOfRange
                | ErrorCodes::Unauthenticated
        )
    }
}

pub trait ScalerError: Error + Send + Sync {
    fn code(&self) -> ErrorCodes;
    fn boxed(self) -> Box<dyn ScalerError>
    where
        Self: Sized + 'static,
    {
        Box::new(self)
    }
    fn should_trace_error(&self) -> bool {
        true
    }
}

impl Error for Box<dyn ScalerError> {}

impl ScalerError for Box<dyn ScalerError> {
    fn code(&self) -> ErrorCodes {
        self.as_ref().code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thiserror::Error;

    #[derive(Debug, Error)]
    #[error("bad input: {0}")]
    struct BadInput(String);

    impl ScalerError for BadInput {
        fn code(&self) -> ErrorCodes {
            ErrorCodes::InvalidArgument
        }
    }

    #[test]
    fn test_boxed_error_keeps_code_and_message() {
        let err = BadInput("table".to_string()).boxed();
        assert_eq!(err.code(), ErrorCodes::InvalidArgument);
        assert_eq!(err.to_string(), "bad input: table");
    }

    #[test]
    fn test_client_errors() {
        assert!(ErrorCodes::InvalidArgument.is_client_error());
        assert!(!ErrorCodes::Internal.is_client_error());
        assert!(!ErrorCodes::Unimplemented.is_client_error());
    }
}
