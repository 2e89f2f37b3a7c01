//! Authentication error types.
//!
//! This module defines errors that can occur while loading trusted keys and
//! verifying signed assertions.

use std::path::PathBuf;

use thiserror::Error;

/// Key loading and assertion verification errors.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`: new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// No trusted key of the token's algorithm family verified the signature.
    #[error("Bad signature")]
    BadSignature,

    /// The key store holds no key usable with the token's algorithm.
    #[error("No suitable signing keys for algorithm {alg}")]
    NoSuitableSigningKeys {
        /// Algorithm declared in the token header.
        alg: String,
    },

    /// The signature verified but required claims are missing or not strings.
    #[error("Malformed payload: missing {}", missing.join(", "))]
    MalformedPayload {
        /// Names of the missing claims, in `sp`, `idp`, `ticket` order.
        missing: Vec<String>,
    },

    /// Not a compact JWS, or the header cannot be decoded.
    #[error("Invalid token format: {0}")]
    InvalidTokenFormat(String),

    /// Algorithm is forbidden or not supported.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The optional `exp` claim is present and in the past.
    #[error("Token expired")]
    TokenExpired,

    /// Invalid public key material.
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// A key file could not be read.
    #[error("Failed to load key from {}: {source}", path.display())]
    KeyLoad {
        /// File that failed to load.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl AuthError {
    /// Creates an [`AuthError::BadSignature`].
    #[must_use]
    pub fn bad_signature() -> Self {
        Self::BadSignature
    }

    /// Creates an [`AuthError::NoSuitableSigningKeys`] for `alg`.
    #[must_use]
    pub fn no_suitable_signing_keys(alg: impl Into<String>) -> Self {
        Self::NoSuitableSigningKeys { alg: alg.into() }
    }

    /// Creates an [`AuthError::MalformedPayload`] naming the missing claims.
    #[must_use]
    pub fn malformed_payload<I, S>(missing: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::MalformedPayload { missing: missing.into_iter().map(Into::into).collect() }
    }

    /// Creates an [`AuthError::InvalidTokenFormat`].
    #[must_use]
    pub fn invalid_token_format(message: impl Into<String>) -> Self {
        Self::InvalidTokenFormat(message.into())
    }

    /// Creates an [`AuthError::UnsupportedAlgorithm`].
    #[must_use]
    pub fn unsupported_algorithm(message: impl Into<String>) -> Self {
        Self::UnsupportedAlgorithm(message.into())
    }

    /// Creates an [`AuthError::TokenExpired`].
    #[must_use]
    pub fn token_expired() -> Self {
        Self::TokenExpired
    }

    /// Creates an [`AuthError::InvalidPublicKey`].
    #[must_use]
    pub fn invalid_public_key(message: impl Into<String>) -> Self {
        Self::InvalidPublicKey(message.into())
    }

    /// Creates an [`AuthError::KeyLoad`].
    #[must_use]
    pub fn key_load(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::KeyLoad { path: path.into(), source }
    }
}

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;
