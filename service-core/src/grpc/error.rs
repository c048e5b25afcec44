//! Error conversion utilities between `AppError` and `tonic::Status`.
//!
//! Every `AppError` leaves the server as an `INTERNAL` status carrying the
//! original human-readable message. Clients tell failures apart by message
//! text; `AppError::kind()` still labels them for logs and counters.

use tonic::{Code, Status};

use crate::error::AppError;

/// Extension trait for converting types into `tonic::Status`.
pub trait IntoStatus {
    /// Convert into a `tonic::Status`.
    fn into_status(self) -> Status;
}

impl IntoStatus for AppError {
    fn into_status(self) -> Status {
        let kind = self.kind();
        let message = match self {
            AppError::MandatoryMissing(field) => format!("Field is mandatory: {}", field),
            AppError::InvalidArgument(err)
            | AppError::NotFound(err)
            | AppError::InvalidState(err)
            | AppError::Unauthenticated(err)
            | AppError::AccessDenied(err)
            | AppError::Conflict(err) => {
                tracing::debug!(kind, error = %err, "Request rejected");
                err.to_string()
            }
            AppError::InternalError(err)
            | AppError::DatabaseError(err)
            | AppError::StorageError(err)
            | AppError::ConfigError(err) => {
                tracing::error!(kind, error = %err, "Request failed");
                err.to_string()
            }
        };
        Status::internal(message)
    }
}

impl From<AppError> for Status {
    fn from(err: AppError) -> Self {
        err.into_status()
    }
}

/// Convert a `tonic::Status` back to an `AppError`.
impl From<Status> for AppError {
    fn from(status: Status) -> Self {
        let message = status.message().to_string();
        match status.code() {
            Code::InvalidArgument | Code::OutOfRange => {
                AppError::InvalidArgument(anyhow::anyhow!(message))
            }
            Code::NotFound => AppError::NotFound(anyhow::anyhow!(message)),
            Code::FailedPrecondition => AppError::InvalidState(anyhow::anyhow!(message)),
            Code::Unauthenticated => AppError::Unauthenticated(anyhow::anyhow!(message)),
            Code::PermissionDenied => AppError::AccessDenied(anyhow::anyhow!(message)),
            Code::AlreadyExists => AppError::Conflict(anyhow::anyhow!(message)),
            Code::Ok => AppError::InternalError(anyhow::anyhow!("Unexpected OK status as error")),
            _ => AppError::InternalError(anyhow::anyhow!(message)),
        }
    }
}

/// Result type alias for gRPC handlers.
pub type GrpcResult<T> = Result<tonic::Response<T>, Status>;
