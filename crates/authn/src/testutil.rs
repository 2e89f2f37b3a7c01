//! Shared test utilities for assertion testing.
//!
//! This module provides helpers for generating Ed25519 key pairs, creating
//! signed assertions, crafting raw JWS strings (for attack testing) and
//! locating the PEM key fixtures. It is feature-gated behind `testutil` to
//! prevent leaking into production builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! idpstat-authn = { path = "../authn", features = ["testutil"] }
//! ```
//!
//! Then import helpers:
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use idpstat_authn::testutil::{generate_test_keypair, create_signed_assertion};
//! ```
//!
//! # Fixtures
//!
//! `tests/fixtures/` holds PEM key pairs for every supported family:
//!
//! | File | Content |
//! |------|---------|
//! | `rsa_private.pem` / `rsa_public.pem` | trusted RSA 2048 pair |
//! | `rsa_untrusted_private.pem` / `rsa_untrusted_public.pem` | second RSA pair, never trusted |
//! | `ec_private.pem` / `ec_public.pem` | P-256 pair |
//! | `ed25519_private.pem` / `ed25519_public.pem` | Ed25519 pair |

use std::path::PathBuf;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use ed25519_dalek::SigningKey;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use rand_core::OsRng;
use serde_json::{Value, json};
use zeroize::Zeroizing;

use crate::keys::{KeyKind, KeySource, KeyStore};

/// Generates a test Ed25519 key pair.
///
/// Returns `(pkcs8_der, public_key_base64url)` where:
/// - `pkcs8_der` is the private key in PKCS#8 DER format wrapped in [`Zeroizing`] (suitable for
///   [`EncodingKey::from_ed_der`])
/// - `public_key_base64url` is the 32-byte public key encoded as base64url without padding
///   (suitable for [`TrustedKey::ed25519_raw`](crate::keys::TrustedKey::ed25519_raw))
///
/// Each call generates a fresh random key pair.
pub fn generate_test_keypair() -> (Zeroizing<Vec<u8>>, String) {
    let signing_key = SigningKey::generate(&mut OsRng);
    let public_key_b64 = URL_SAFE_NO_PAD.encode(signing_key.verifying_key().to_bytes());

    let private_bytes: Zeroizing<[u8; 32]> = Zeroizing::new(signing_key.to_bytes());
    let mut pkcs8_der = Zeroizing::new(vec![
        0x30, 0x2e, // SEQUENCE, 46 bytes
        0x02, 0x01, 0x00, // INTEGER version 0
        0x30, 0x05, // SEQUENCE, 5 bytes (algorithm identifier)
        0x06, 0x03, 0x2b, 0x65, 0x70, // OID 1.3.101.112 (Ed25519)
        0x04, 0x22, // OCTET STRING, 34 bytes
        0x04, 0x20, // OCTET STRING, 32 bytes (the actual key)
    ]);
    pkcs8_der.extend_from_slice(&*private_bytes);

    (pkcs8_der, public_key_b64)
}

/// Signs `claims` as an `EdDSA` assertion with a PKCS#8 DER Ed25519 key.
///
/// # Panics
///
/// Panics if encoding fails (should not happen with a key from
/// [`generate_test_keypair`]).
pub fn create_signed_assertion(pkcs8_der: &[u8], claims: &Value) -> String {
    let encoding_key = EncodingKey::from_ed_der(pkcs8_der);
    jsonwebtoken::encode(&Header::new(Algorithm::EdDSA), claims, &encoding_key)
        .expect("Failed to encode test assertion")
}

/// Signs `claims` with a PEM private key from [`fixture_path`].
///
/// # Panics
///
/// Panics if the fixture is missing or does not match `alg`.
pub fn sign_with_fixture(private_key_fixture: &str, alg: Algorithm, claims: &Value) -> String {
    let pem = std::fs::read(fixture_path(private_key_fixture)).expect("fixture should exist");
    let encoding_key = match alg {
        Algorithm::ES256 | Algorithm::ES384 => EncodingKey::from_ec_pem(&pem),
        Algorithm::EdDSA => EncodingKey::from_ed_pem(&pem),
        _ => EncodingKey::from_rsa_pem(&pem),
    }
    .expect("fixture should be a valid private key");
    jsonwebtoken::encode(&Header::new(alg), claims, &encoding_key)
        .expect("Failed to encode test assertion")
}

/// The canonical registration claims.
#[must_use]
pub fn registration_claims(sp: &str, idp: &str, ticket: &str) -> Value {
    json!({ "sp": sp, "idp": idp, "ticket": ticket })
}

/// Creates a raw JWS string from arbitrary header and payload JSON.
///
/// The result has the structure `{header_b64}.{payload_b64}.` with an empty
/// signature. This is useful for testing rejection of malformed or attack
/// tokens (e.g., `alg: "none"`, algorithm confusion).
///
/// # Panics
///
/// Panics if JSON serialization fails.
pub fn craft_raw_jwt(header_json: &Value, payload_json: &Value) -> String {
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header_json).expect("header json"));
    let payload_b64 =
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload_json).expect("payload json"));
    format!("{header_b64}.{payload_b64}.")
}

/// Absolute path of a file in `crates/authn/tests/fixtures`.
#[must_use]
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures").join(name)
}

/// [`KeySource`]s for the trusted public key fixtures (RSA, EC and Ed25519).
#[must_use]
pub fn fixture_key_sources() -> Vec<KeySource> {
    vec![
        KeySource::new(fixture_path("rsa_public.pem"), KeyKind::Rsa),
        KeySource::new(fixture_path("ec_public.pem"), KeyKind::Ec),
        KeySource::new(fixture_path("ed25519_public.pem"), KeyKind::Ed25519),
    ]
}

/// A [`KeyStore`] loaded from [`fixture_key_sources`].
///
/// # Panics
///
/// Panics if a fixture fails to load.
#[must_use]
pub fn fixture_key_store() -> KeyStore {
    KeyStore::load(&fixture_key_sources()).expect("fixture keys should load")
}

/// Asserts that a [`Result<T, AuthError>`](crate::AuthError) is an `Err`
/// matching the given variant.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use idpstat_authn::assert_auth_error;
/// use idpstat_authn::error::AuthError;
///
/// let result: Result<(), AuthError> = Err(AuthError::token_expired());
/// assert_auth_error!(result, TokenExpired);
/// ```
#[macro_export]
macro_rules! assert_auth_error {
    ($result:expr, $variant:ident) => {{
        let result = &$result;
        assert!(
            matches!(result, Err($crate::error::AuthError::$variant { .. })),
            "expected AuthError::{}, got: {:?}",
            stringify!($variant),
            result,
        );
    }};
    ($result:expr, $variant:ident, $msg:expr) => {{
        let result = &$result;
        assert!(
            matches!(result, Err($crate::error::AuthError::$variant { .. })),
            "{}: expected AuthError::{}, got: {:?}",
            $msg,
            stringify!($variant),
            result,
        );
    }};
}
