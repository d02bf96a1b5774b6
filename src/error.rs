//! Error types for FileVault.

use thiserror::Error;

/// Common error type for FileVault.
#[derive(Error, Debug)]
pub enum VaultError {
    /// The request was rejected before touching storage.
    ///
    /// Raised for oversized files, disallowed mimetypes, missing files and
    /// missing rename targets. Never retried.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Resource not found (unparseable id or no such record).
    #[error("{0} not found")]
    NotFound(String),

    /// The storage engine failed while writing or deleting.
    #[error("storage failure: {0}")]
    StorageFailure(String),

    /// Database error.
    ///
    /// Errors from sqlx are converted into this variant automatically.
    #[error("database error: {0}")]
    Database(String),

    /// Database connection error.
    #[error("database connection error: {0}")]
    DatabaseConnection(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for VaultError {
    fn from(e: sqlx::Error) -> Self {
        VaultError::Database(e.to_string())
    }
}

impl VaultError {
    /// Returns true if this error is a `NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, VaultError::NotFound(_))
    }
}

/// Result type alias for FileVault operations.
pub type Result<T> = std::result::Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_request_display() {
        let err = VaultError::InvalidRequest("file too large".to_string());
        assert_eq!(err.to_string(), "invalid request: file too large");
    }

    #[test]
    fn test_not_found_display() {
        let err = VaultError::NotFound("file abc".to_string());
        assert_eq!(err.to_string(), "file abc not found");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_storage_failure_display() {
        let err = VaultError::StorageFailure("disk full".to_string());
        assert_eq!(err.to_string(), "storage failure: disk full");
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: VaultError = io_err.into();
        assert!(matches!(err, VaultError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_serde_error_conversion() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: VaultError = serde_err.into();
        assert!(matches!(err, VaultError::Serialization(_)));
    }

    #[test]
    fn test_result_alias() {
        fn sample_ok() -> Result<i32> {
            Ok(42)
        }

        fn sample_err() -> Result<i32> {
            Err(VaultError::Config("bad".to_string()))
        }

        assert_eq!(sample_ok().unwrap(), 42);
        assert!(sample_err().is_err());
    }
}
