//! JWS algorithm policy.
//!
//! This module decides which header algorithms are acceptable and which
//! [`KeyKind`] family a verifying key must belong to.
//!
//! # Security
//!
//! - Symmetric algorithms and `none` are always rejected, so an attacker cannot
//!   downgrade verification to a shared secret or to no signature at all.
//! - The key family is derived from the algorithm, never the other way round, which
//!   closes algorithm-confusion attacks (e.g. an RSA public key used as an HMAC secret).

use std::str::FromStr;

use jsonwebtoken::Algorithm;

use crate::{error::AuthError, keys::KeyKind};

/// Forbidden JWS algorithms that are never accepted.
///
/// - `none`: no signature verification
/// - `HS256`, `HS384`, `HS512`: symmetric algorithms (shared secret)
pub const FORBIDDEN_ALGORITHMS: &[&str] = &["none", "HS256", "HS384", "HS512"];

/// Accepted JWS algorithms.
///
/// Every asymmetric algorithm `jsonwebtoken` can verify against a PEM public
/// key.
pub const ACCEPTED_ALGORITHMS: &[&str] =
    &["RS256", "RS384", "RS512", "PS256", "PS384", "PS512", "ES256", "ES384", "EdDSA"];

/// Validate a header algorithm against the policy and parse it.
///
/// # Errors
///
/// Returns [`AuthError::UnsupportedAlgorithm`] if the algorithm is forbidden
/// or not in [`ACCEPTED_ALGORITHMS`].
///
/// # Examples
///
/// ```
/// use idpstat_authn::validation::validate_algorithm;
///
/// assert!(validate_algorithm("RS256").is_ok());
/// assert!(validate_algorithm("EdDSA").is_ok());
/// assert!(validate_algorithm("HS256").is_err());
/// assert!(validate_algorithm("none").is_err());
/// ```
pub fn validate_algorithm(alg: &str) -> Result<Algorithm, AuthError> {
    if FORBIDDEN_ALGORITHMS.contains(&alg) {
        return Err(AuthError::unsupported_algorithm(format!(
            "Algorithm '{alg}' is not allowed for security reasons"
        )));
    }

    if !ACCEPTED_ALGORITHMS.contains(&alg) {
        return Err(AuthError::unsupported_algorithm(format!(
            "Algorithm '{alg}' is not in accepted list"
        )));
    }

    Algorithm::from_str(alg).map_err(|_| {
        AuthError::unsupported_algorithm(format!("Algorithm '{alg}' is not recognised"))
    })
}

/// Key family able to verify `alg`, or `None` for symmetric algorithms.
#[must_use]
pub fn key_kind_for(alg: Algorithm) -> Option<KeyKind> {
    match alg {
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => Some(KeyKind::Rsa),
        Algorithm::ES256 | Algorithm::ES384 => Some(KeyKind::Ec),
        Algorithm::EdDSA => Some(KeyKind::Ed25519),
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => None,
    }
}
