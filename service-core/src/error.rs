use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(anyhow::Error),

    #[error("Field is mandatory: {0}")]
    MandatoryMissing(String),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Invalid state: {0}")]
    InvalidState(anyhow::Error),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(anyhow::Error),

    #[error("Access denied: {0}")]
    AccessDenied(anyhow::Error),

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Storage error: {0}")]
    StorageError(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl AppError {
    /// Shorthand for a missing mandatory field.
    pub fn mandatory(field: impl Into<String>) -> Self {
        AppError::MandatoryMissing(field.into())
    }

    /// Label used for the error counters.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidArgument(_) | AppError::MandatoryMissing(_) => "validation_error",
            AppError::NotFound(_) => "not_found",
            AppError::InvalidState(_) => "invalid_state",
            AppError::Unauthenticated(_) => "unauthenticated",
            AppError::AccessDenied(_) => "access_denied",
            AppError::Conflict(_) => "conflict",
            AppError::InternalError(_) => "internal_error",
            AppError::DatabaseError(_) => "db_error",
            AppError::StorageError(_) => "storage_error",
            AppError::ConfigError(_) => "config_error",
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::StorageError(anyhow::Error::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mandatory_message_names_the_field() {
        let err = AppError::mandatory("business_partner_id");
        assert_eq!(err.to_string(), "Field is mandatory: business_partner_id");
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn io_errors_are_storage_errors() {
        let err: AppError = std::io::Error::other("disk full").into();
        assert!(matches!(err, AppError::StorageError(_)));
    }
}
