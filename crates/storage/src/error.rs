//! Storage error types and result alias.
//!
//! Every [`StatStore`](crate::StatStore) implementation maps its internal
//! failures onto [`StorageError`], so the service layer can handle all
//! backends the same way.
//!
//! # Error Types
//!
//! - [`StorageError::Validation`] - A required field was empty; nothing was written
//! - [`StorageError::Conflict`] - A uniqueness constraint was violated (e.g. duplicate ticket)
//! - [`StorageError::Serialization`] - A stored value could not be decoded
//! - [`StorageError::Internal`] - Backend-specific internal errors
//! - [`StorageError::Timeout`] - The backend was busy for longer than its timeout
//!
//! # Example
//!
//! ```
//! use idpstat_storage::{StorageError, StorageResult};
//!
//! fn require_sp(sp: &str) -> StorageResult<()> {
//!     if sp.is_empty() {
//!         return Err(StorageError::validation("sp", "must not be empty"));
//!     }
//!     Ok(())
//! }
//!
//! assert!(require_sp("").is_err());
//! ```

use std::sync::Arc;

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
///
/// Errors preserve their source chain via the `#[source]` attribute.
///
/// # Non-exhaustive
///
/// New variants may be added in future minor releases. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// A required field failed validation.
    ///
    /// Raised before any mutation, so a rejected call never leaves a
    /// partial write behind.
    #[error("Validation failed for '{field}': {reason}")]
    Validation {
        /// Name of the offending field (`sp`, `idp` or `ticket`).
        field: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A uniqueness constraint was violated.
    #[error("Conflict: {message}")]
    Conflict {
        /// Description of the conflicting write.
        message: String,
    },

    /// A stored value could not be decoded.
    ///
    /// This typically indicates data corruption or a schema mismatch.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization error.
        message: String,
        /// The underlying error that caused serialization to fail.
        #[source]
        source: Option<BoxError>,
    },

    /// Internal storage backend error.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
        /// The underlying error that caused this internal failure.
        #[source]
        source: Option<BoxError>,
    },

    /// The backend stayed busy past its configured timeout.
    #[error("Operation timeout")]
    Timeout,
}

impl StorageError {
    /// Creates a new `Validation` error for the given field.
    #[must_use]
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation { field: field.into(), reason: reason.into() }
    }

    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict { message: message.into() }
    }

    /// Creates a new `Serialization` error with a message and source error.
    #[must_use]
    pub fn serialization_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Internal` error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Creates a new `Internal` error with a message and source error.
    #[must_use]
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout() -> Self {
        Self::Timeout
    }

    /// Returns `true` if retrying the same call later may succeed.
    ///
    /// Only [`Timeout`](Self::Timeout) is transient. The core never retries on
    /// its own; this is a hint for the caller.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => StorageError::Timeout,
            Some(ErrorCode::ConstraintViolation) => StorageError::conflict(err.to_string()),
            _ => StorageError::internal_with_source("SQLite operation failed", err),
        }
    }
}
