//! Stat service error types.

use std::fmt;

use idpstat_authn::AuthError;
use idpstat_storage::StorageError;
use thiserror::Error;

/// Why a ticket could not be redeemed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TicketRejection {
    /// The ticket was never issued or has already been redeemed.
    Unknown,
    /// The ticket was outstanding but older than the configured TTL. It has
    /// been consumed by the rejected attempt.
    Expired,
}

impl fmt::Display for TicketRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("unknown or already used"),
            Self::Expired => f.write_str("expired"),
        }
    }
}

/// Errors returned by the stat service.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`: new variants may be added in
/// future minor releases without a semver-breaking change.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StatError {
    /// The ticket cannot authorize a registration.
    #[error("Invalid ticket: {reason}")]
    InvalidTicket {
        /// Ticket state that caused the rejection.
        reason: TicketRejection,
    },

    /// A required value is empty. Nothing was written.
    #[error("Validation error: {field}: {reason}")]
    Validation {
        /// Name of the offending field (`sp`, `idp` or `ticket`).
        field: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The signed assertion was rejected.
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// The store failed.
    #[error("Storage error: {0}")]
    Storage(#[source] StorageError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StatError {
    /// Creates an [`StatError::InvalidTicket`].
    #[must_use]
    pub fn invalid_ticket(reason: TicketRejection) -> Self {
        Self::InvalidTicket { reason }
    }

    /// Creates a [`StatError::Config`].
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// HTTP status an API layer should answer with.
    ///
    /// Caller mistakes are `400`, failed authentication or ticket checks are
    /// `401`, and server-side faults (including a key store with no key for
    /// the assertion's algorithm) are `500`.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::InvalidTicket { .. } => 401,
            Self::Auth(err) => match err {
                AuthError::MalformedPayload { .. } | AuthError::InvalidTokenFormat(_) => 400,
                AuthError::BadSignature
                | AuthError::TokenExpired
                | AuthError::UnsupportedAlgorithm(_) => 401,
                _ => 500,
            },
            Self::Storage(_) | Self::Config(_) => 500,
        }
    }
}

impl From<StorageError> for StatError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Validation { field, reason, .. } => Self::Validation { field, reason },
            other => Self::Storage(other),
        }
    }
}

/// Result type alias for stat service operations.
pub type Result<T> = std::result::Result<T, StatError>;
