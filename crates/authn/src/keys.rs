//! Trusted verification keys.
//!
//! A [`KeyStore`] is the fixed set of public keys signed assertions are
//! checked against. It is built once before traffic is served, shared as
//! `Arc<KeyStore>` and never mutated afterwards, so readers need no
//! synchronization.
//!
//! Keys carry no identity: verification tries every key of the right
//! [`KeyKind`] until one succeeds.
//!
//! # Example
//!
//! ```no_run
//! use idpstat_authn::keys::{KeyKind, KeySource, KeyStore};
//!
//! # fn example() -> Result<(), idpstat_authn::AuthError> {
//! let store = KeyStore::load(&[
//!     KeySource::new("/etc/idpstat/signer.pem", KeyKind::Rsa),
//!     KeySource::new("/etc/idpstat/backup.pem", KeyKind::Ed25519),
//! ])?;
//! assert_eq!(store.len(), 2);
//! # Ok(())
//! # }
//! ```

use std::{fmt, path::PathBuf};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use ed25519_dalek::{PUBLIC_KEY_LENGTH, VerifyingKey};
use jsonwebtoken::DecodingKey;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::{
    error::AuthError,
    validation::{key_kind_for, validate_algorithm},
};

/// Public key family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    /// RSA public key (`RS*` and `PS*` algorithms).
    #[default]
    Rsa,
    /// Elliptic-curve public key (`ES256`, `ES384`).
    Ec,
    /// Ed25519 public key (`EdDSA`).
    Ed25519,
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rsa => f.write_str("rsa"),
            Self::Ec => f.write_str("ec"),
            Self::Ed25519 => f.write_str("ed25519"),
        }
    }
}

/// Where to load one trusted key from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeySource {
    /// PEM file holding the public key.
    pub path: PathBuf,

    /// Key family; defaults to RSA.
    #[serde(default)]
    pub kind: KeyKind,
}

impl KeySource {
    /// Creates a key source.
    pub fn new(path: impl Into<PathBuf>, kind: KeyKind) -> Self {
        Self { path: path.into(), kind }
    }
}

/// One trusted verification key.
#[derive(Clone)]
pub struct TrustedKey {
    kind: KeyKind,
    label: String,
    key: DecodingKey,
}

impl TrustedKey {
    /// Parses an RSA public key from PEM (`PUBLIC KEY` or `RSA PUBLIC KEY`).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidPublicKey`] if the PEM is not an RSA key.
    pub fn rsa_pem(pem: &[u8]) -> Result<Self, AuthError> {
        let key = DecodingKey::from_rsa_pem(pem)
            .map_err(|e| AuthError::invalid_public_key(format!("RSA PEM: {e}")))?;
        Ok(Self::new(KeyKind::Rsa, "rsa-pem", key))
    }

    /// Parses an elliptic-curve public key from PEM.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidPublicKey`] if the PEM is not an EC key.
    pub fn ec_pem(pem: &[u8]) -> Result<Self, AuthError> {
        let key = DecodingKey::from_ec_pem(pem)
            .map_err(|e| AuthError::invalid_public_key(format!("EC PEM: {e}")))?;
        Ok(Self::new(KeyKind::Ec, "ec-pem", key))
    }

    /// Parses an Ed25519 public key from PEM.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidPublicKey`] if the PEM is not an Ed25519 key.
    pub fn ed_pem(pem: &[u8]) -> Result<Self, AuthError> {
        let key = DecodingKey::from_ed_pem(pem)
            .map_err(|e| AuthError::invalid_public_key(format!("Ed25519 PEM: {e}")))?;
        Ok(Self::new(KeyKind::Ed25519, "ed25519-pem", key))
    }

    /// Parses a raw 32-byte Ed25519 public key encoded as base64url without
    /// padding.
    ///
    /// The bytes are checked to be a valid curve point before the key is
    /// accepted.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidPublicKey`] if the encoding, length or
    /// point is invalid.
    pub fn ed25519_raw(public_key_b64: &str) -> Result<Self, AuthError> {
        let bytes: Zeroizing<Vec<u8>> = Zeroizing::new(
            URL_SAFE_NO_PAD
                .decode(public_key_b64.as_bytes())
                .map_err(|e| AuthError::invalid_public_key(format!("base64 decode: {e}")))?,
        );

        let key_bytes: [u8; PUBLIC_KEY_LENGTH] = bytes.as_slice().try_into().map_err(|_| {
            AuthError::invalid_public_key(format!(
                "expected {PUBLIC_KEY_LENGTH} bytes, got {}",
                bytes.len()
            ))
        })?;

        VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| AuthError::invalid_public_key(format!("invalid Ed25519 key: {e}")))?;

        let key = DecodingKey::from_ed_components(public_key_b64)
            .map_err(|e| AuthError::invalid_public_key(e.to_string()))?;
        Ok(Self::new(KeyKind::Ed25519, "ed25519-raw", key))
    }

    /// Reads and parses the key described by `source`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::KeyLoad`] if the file cannot be read.
    /// - [`AuthError::InvalidPublicKey`] if its content does not match `source.kind`.
    pub fn from_source(source: &KeySource) -> Result<Self, AuthError> {
        let pem =
            std::fs::read(&source.path).map_err(|e| AuthError::key_load(&source.path, e))?;
        let key = match source.kind {
            KeyKind::Rsa => Self::rsa_pem(&pem),
            KeyKind::Ec => Self::ec_pem(&pem),
            KeyKind::Ed25519 => Self::ed_pem(&pem),
        }?;
        Ok(key.with_label(source.path.display().to_string()))
    }

    fn new(kind: KeyKind, label: &str, key: DecodingKey) -> Self {
        Self { kind, label: label.to_owned(), key }
    }

    /// Replaces the label used in logs and `Debug` output.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Key family.
    #[must_use]
    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    /// Human-readable origin of the key, e.g. its file path.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

impl fmt::Debug for TrustedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustedKey")
            .field("kind", &self.kind)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Immutable set of trusted verification keys.
#[derive(Debug, Clone, Default)]
pub struct KeyStore {
    keys: Vec<TrustedKey>,
}

impl KeyStore {
    /// Loads every key in `sources`.
    ///
    /// Loading is all-or-nothing: the first failing source aborts the load.
    ///
    /// # Errors
    ///
    /// Returns the first [`AuthError::KeyLoad`] or
    /// [`AuthError::InvalidPublicKey`] encountered.
    #[tracing::instrument(skip(sources), fields(count = sources.len()))]
    pub fn load(sources: &[KeySource]) -> Result<Self, AuthError> {
        let keys = sources.iter().map(TrustedKey::from_source).collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(count = keys.len(), "loaded trusted keys");
        Ok(Self { keys })
    }

    /// Builds a store from already-parsed keys.
    #[must_use]
    pub fn from_keys(keys: Vec<TrustedKey>) -> Self {
        Self { keys }
    }

    /// Number of trusted keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns `true` if at least one key can verify tokens signed with `alg`.
    #[must_use]
    pub fn supports(&self, alg: &str) -> bool {
        validate_algorithm(alg)
            .ok()
            .and_then(key_kind_for)
            .is_some_and(|kind| self.keys.iter().any(|k| k.kind == kind))
    }

    /// Keys of the given family, in load order.
    pub fn keys_of(&self, kind: KeyKind) -> impl Iterator<Item = &TrustedKey> {
        self.keys.iter().filter(move |k| k.kind == kind)
    }

    /// All keys, in load order.
    #[must_use]
    pub fn keys(&self) -> &[TrustedKey] {
        &self.keys
    }
}

impl FromIterator<TrustedKey> for KeyStore {
    fn from_iter<I: IntoIterator<Item = TrustedKey>>(iter: I) -> Self {
        Self { keys: iter.into_iter().collect() }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::testutil::{fixture_path, generate_test_keypair};

    fn fixture(name: &str) -> Vec<u8> {
        std::fs::read(fixture_path(name)).expect("fixture should exist")
    }

    #[test]
    fn test_parse_pem_fixtures() {
        assert_eq!(TrustedKey::rsa_pem(&fixture("rsa_public.pem")).unwrap().kind(), KeyKind::Rsa);
        assert_eq!(TrustedKey::ec_pem(&fixture("ec_public.pem")).unwrap().kind(), KeyKind::Ec);
        assert_eq!(
            TrustedKey::ed_pem(&fixture("ed25519_public.pem")).unwrap().kind(),
            KeyKind::Ed25519
        );
    }

    #[test]
    fn test_garbage_pem_is_invalid_public_key() {
        let result = TrustedKey::rsa_pem(b"-----BEGIN PUBLIC KEY-----\nnope\n-----END PUBLIC KEY-----\n");
        assert!(matches!(result, Err(AuthError::InvalidPublicKey(_))));
    }

    #[test]
    fn test_ed25519_raw_accepts_generated_key() {
        let (_, public_key_b64) = generate_test_keypair();
        let key = TrustedKey::ed25519_raw(&public_key_b64).expect("valid key");
        assert_eq!(key.kind(), KeyKind::Ed25519);
    }

    #[test]
    fn test_ed25519_raw_rejects_wrong_length() {
        let short = URL_SAFE_NO_PAD.encode([7u8; 16]);
        let result = TrustedKey::ed25519_raw(&short);
        assert!(matches!(result, Err(AuthError::InvalidPublicKey(ref msg)) if msg.contains("expected 32 bytes")));
    }

    #[test]
    fn test_ed25519_raw_rejects_bad_base64() {
        let result = TrustedKey::ed25519_raw("!!not base64!!");
        assert!(matches!(result, Err(AuthError::InvalidPublicKey(ref msg)) if msg.contains("base64")));
    }

    #[test]
    fn test_load_labels_keys_with_path() {
        let sources = [
            KeySource::new(fixture_path("rsa_public.pem"), KeyKind::Rsa),
            KeySource::new(fixture_path("ec_public.pem"), KeyKind::Ec),
        ];
        let store = KeyStore::load(&sources).expect("load");

        assert_eq!(store.len(), 2);
        assert!(store.keys()[0].label().ends_with("rsa_public.pem"));
        assert!(store.supports("RS256"));
        assert!(store.supports("ES256"));
        assert!(!store.supports("EdDSA"));
        assert!(!store.supports("HS256"), "symmetric algorithms are never supported");
    }

    #[test]
    fn test_load_missing_file_is_key_load_error() {
        let result = KeyStore::load(&[KeySource::new("/nonexistent/key.pem", KeyKind::Rsa)]);
        match result {
            Err(AuthError::KeyLoad { path, .. }) => {
                assert_eq!(path, Path::new("/nonexistent/key.pem"));
            },
            other => panic!("expected KeyLoad, got {other:?}"),
        }
    }

    #[test]
    fn test_load_wrong_kind_is_invalid_public_key() {
        let result = KeyStore::load(&[KeySource::new(fixture_path("rsa_public.pem"), KeyKind::Ec)]);
        assert!(matches!(result, Err(AuthError::InvalidPublicKey(_))));
    }

    #[test]
    fn test_key_source_kind_defaults_to_rsa() {
        let source: KeySource = serde_json::from_str(r#"{"path": "k.pem"}"#).expect("parse");
        assert_eq!(source.kind, KeyKind::Rsa);

        let source: KeySource =
            serde_json::from_str(r#"{"path": "k.pem", "kind": "ed25519"}"#).expect("parse");
        assert_eq!(source.kind, KeyKind::Ed25519);
    }

    #[test]
    fn test_key_source_rejects_unknown_fields() {
        let result = serde_json::from_str::<KeySource>(r#"{"path": "k.pem", "kid": "x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_does_not_print_key_material() {
        let key = TrustedKey::rsa_pem(&fixture("rsa_public.pem")).unwrap().with_label("signer");
        let debug = format!("{key:?}");
        assert!(debug.contains("signer"));
        assert!(!debug.contains("MII"), "key material must not be printed: {debug}");
    }
}
