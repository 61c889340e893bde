//! Storage error types.

use std::fmt;

use portal_shared::AppError;
use thiserror::Error;

/// Storage operation that failed, carried for log and error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOp {
    /// Object upload.
    Upload,
    /// Object download.
    Download,
    /// Object metadata lookup.
    Stat,
    /// Object deletion.
    Delete,
    /// Signed URL generation.
    Presign,
    /// Local spooling of a download.
    Spool,
}

impl StorageOp {
    /// Lower-case label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
            Self::Stat => "stat",
            Self::Delete => "delete",
            Self::Presign => "presign",
            Self::Spool => "spool",
        }
    }
}

impl fmt::Display for StorageOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Missing or invalid client configuration.
    #[error("storage configuration error: {0}")]
    Configuration(String),

    /// Object does not exist in the store.
    #[error("file not found: {key}")]
    NotFound {
        /// Storage key that was not found.
        key: String,
    },

    /// Transport or local I/O failure.
    #[error("failed to {operation} file '{key}': {message}")]
    Operation {
        /// Operation that failed.
        operation: StorageOp,
        /// Storage key involved.
        key: String,
        /// Underlying failure description.
        message: String,
    },

    /// Key or key component is malformed.
    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    /// Requested feature is not available with the current configuration.
    #[error("unsupported storage configuration: {0}")]
    UnsupportedConfiguration(String),
}

impl StorageError {
    /// Create a configuration error.
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create an operation error.
    #[must_use]
    pub fn operation(operation: StorageOp, key: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Operation {
            operation,
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Create an invalid key error.
    #[must_use]
    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }

    /// Create an unsupported configuration error.
    #[must_use]
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedConfiguration(msg.into())
    }

    /// Translates an OpenDAL error raised while working on `key`.
    ///
    /// Only reads can surface [`StorageError::NotFound`]; a missing key on
    /// any other operation is an operation failure.
    #[must_use]
    pub fn from_transport(operation: StorageOp, key: &str, err: &opendal::Error) -> Self {
        let is_read = matches!(operation, StorageOp::Download | StorageOp::Stat);
        match err.kind() {
            opendal::ErrorKind::NotFound if is_read => Self::not_found(key),
            opendal::ErrorKind::Unsupported if operation == StorageOp::Presign => {
                Self::unsupported(format!("backend cannot presign: {err}"))
            }
            _ => Self::operation(operation, key, err),
        }
    }

    /// Returns true for the expected "object absent" condition.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Stable error code for client-side handling.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Operation { .. } => "S3_ERROR",
            Self::InvalidKey(_) => "VALIDATION_ERROR",
            Self::UnsupportedConfiguration(_) => "UNSUPPORTED_CONFIGURATION",
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        let message = err.to_string();
        match err {
            StorageError::NotFound { .. } => Self::NotFound("File not found.".to_string()),
            StorageError::Operation { operation, .. } => {
                Self::Storage(format!("Failed to {operation} file."))
            }
            StorageError::InvalidKey(msg) => Self::Validation(msg),
            StorageError::Configuration(_) | StorageError::UnsupportedConfiguration(_) => {
                Self::Internal(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_only_for_reads() {
        let err = opendal::Error::new(opendal::ErrorKind::NotFound, "no such key");

        let download = StorageError::from_transport(StorageOp::Download, "a/b", &err);
        assert!(matches!(download, StorageError::NotFound { ref key } if key == "a/b"));

        let stat = StorageError::from_transport(StorageOp::Stat, "a/b", &err);
        assert!(stat.is_not_found());

        let delete = StorageError::from_transport(StorageOp::Delete, "a/b", &err);
        assert!(matches!(
            delete,
            StorageError::Operation {
                operation: StorageOp::Delete,
                ..
            }
        ));
    }

    #[test]
    fn test_other_transport_errors_are_operation_failures() {
        let err = opendal::Error::new(opendal::ErrorKind::PermissionDenied, "denied");
        let mapped = StorageError::from_transport(StorageOp::Upload, "users/1/x.png", &err);

        assert_eq!(mapped.error_code(), "S3_ERROR");
        assert!(mapped.to_string().starts_with("failed to upload file 'users/1/x.png'"));
    }

    #[test]
    fn test_presign_unsupported() {
        let err = opendal::Error::new(opendal::ErrorKind::Unsupported, "presign");
        let mapped = StorageError::from_transport(StorageOp::Presign, "k", &err);
        assert!(matches!(mapped, StorageError::UnsupportedConfiguration(_)));
    }

    #[test]
    fn test_into_app_error() {
        let app: AppError = StorageError::not_found("k").into();
        assert_eq!(app.status_code(), 404);

        let app: AppError = StorageError::operation(StorageOp::Delete, "k", "boom").into();
        assert_eq!(app.error_code(), "S3_ERROR");
        assert_eq!(app.to_string(), "Storage error: Failed to delete file.");

        let app: AppError = StorageError::invalid_key("empty extension").into();
        assert_eq!(app.status_code(), 400);

        let app: AppError = StorageError::configuration("missing bucket").into();
        assert_eq!(app.error_code(), "INTERNAL_ERROR");
    }
}
