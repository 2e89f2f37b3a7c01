//! # idpstat authentication
//!
//! Trusted keys and signed-assertion verification for the idpstat service.
//!
//! This crate provides:
//! - **Key store**: an immutable set of RSA, EC and Ed25519 public keys loaded once at startup
//! - **Assertion verification**: signature checks against every key of the matching family, then
//!   extraction of the `sp`, `idp` and `ticket` claims
//! - **Algorithm policy**: `none` and HMAC algorithms are always rejected
//!
//! ## Example
//!
//! ```no_run
//! use idpstat_authn::{KeyKind, KeySource, KeyStore, unpack};
//!
//! # fn example(token: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let keys = KeyStore::load(&[KeySource::new("/etc/idpstat/signer.pem", KeyKind::Rsa)])?;
//! let claims = unpack(token, &keys)?;
//!
//! println!("{} -> {} ({})", claims.sp, claims.idp, claims.ticket);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - **`testutil`**: key pair generation, assertion signing helpers, PEM fixtures and the
//!   `assert_auth_error!` macro for tests.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Signed-assertion verification.
pub mod assertion;
/// Authentication error types.
pub mod error;
/// Trusted verification keys.
pub mod keys;
/// Shared test utilities.
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
/// Algorithm policy.
pub mod validation;

// Re-export key types for convenience
pub use assertion::{AssertionClaims, unpack};
pub use error::{AuthError, Result};
pub use keys::{KeyKind, KeySource, KeyStore, TrustedKey};
pub use validation::{ACCEPTED_ALGORITHMS, FORBIDDEN_ALGORITHMS, validate_algorithm};
