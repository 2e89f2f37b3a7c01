//! Signed-assertion verification.
//!
//! A signed assertion is a compact JWS whose payload carries the three
//! registration claims:
//!
//! ```json
//! {
//!   "sp": "https://sp.example.org/shibboleth",
//!   "idp": "https://idp.example.org/idp/shibboleth",
//!   "ticket": "<token returned by create_ticket>"
//! }
//! ```
//!
//! [`unpack`] checks the signature against a [`KeyStore`] and extracts the
//! claims. It has no side effects; replay protection is the job of the
//! ticket, not of the verifier.

use std::collections::HashSet;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Validation, decode, errors::ErrorKind, get_current_timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::AuthError,
    keys::KeyStore,
    validation::{key_kind_for, validate_algorithm},
};

/// Claim naming the service provider.
pub const CLAIM_SP: &str = "sp";
/// Claim naming the identity provider.
pub const CLAIM_IDP: &str = "idp";
/// Claim carrying the ticket token.
pub const CLAIM_TICKET: &str = "ticket";
/// Optional expiry claim (seconds since the epoch).
pub const CLAIM_EXP: &str = "exp";

/// Claims extracted from a verified assertion.
///
/// Values are returned as found; an empty string counts as present and is
/// rejected later by storage validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
    /// Service provider.
    pub sp: String,
    /// Identity provider chosen by the user.
    pub idp: String,
    /// Ticket authorizing this registration.
    pub ticket: String,
}

impl AssertionClaims {
    /// Creates a claims set.
    pub fn new(sp: impl Into<String>, idp: impl Into<String>, ticket: impl Into<String>) -> Self {
        Self { sp: sp.into(), idp: idp.into(), ticket: ticket.into() }
    }
}

#[derive(Deserialize)]
struct RawHeader {
    alg: String,
}

/// Reads the `alg` header parameter without verifying anything.
///
/// The raw string is returned so that `none` and other names `jsonwebtoken`
/// cannot represent still reach the algorithm policy.
fn header_algorithm(token: &str) -> Result<String, AuthError> {
    let mut segments = token.split('.');
    let (Some(header), Some(_), Some(_), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        return Err(AuthError::invalid_token_format("expected three dot-separated segments"));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(header)
        .map_err(|e| AuthError::invalid_token_format(format!("header is not base64url: {e}")))?;
    let raw: RawHeader = serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::invalid_token_format(format!("failed to decode header: {e}")))?;
    Ok(raw.alg)
}

/// Enforces an `exp` claim that `jsonwebtoken` did not check.
///
/// `jsonwebtoken` only validates `exp` values it reads as unsigned integers
/// unless the claim is required. Fractional and negative timestamps are
/// compared here; any other type makes the payload malformed.
#[allow(clippy::cast_precision_loss)]
fn check_expiry(payload: &Value, leeway: u64) -> Result<(), AuthError> {
    match payload.get(CLAIM_EXP) {
        None => Ok(()),
        Some(Value::Number(exp)) if exp.as_u64().is_some() => Ok(()),
        Some(Value::Number(exp)) => {
            let exp = exp.as_f64().unwrap_or(f64::NEG_INFINITY);
            let now = get_current_timestamp().saturating_sub(leeway) as f64;
            if exp < now { Err(AuthError::token_expired()) } else { Ok(()) }
        },
        Some(_) => Err(AuthError::malformed_payload([CLAIM_EXP])),
    }
}

fn claims_from_payload(payload: &Value) -> Result<AssertionClaims, AuthError> {
    let object = payload.as_object();
    let claim = |name: &str| {
        object.and_then(|o| o.get(name)).and_then(Value::as_str).map(str::to_owned)
    };

    match (claim(CLAIM_SP), claim(CLAIM_IDP), claim(CLAIM_TICKET)) {
        (Some(sp), Some(idp), Some(ticket)) => Ok(AssertionClaims { sp, idp, ticket }),
        (sp, idp, ticket) => Err(AuthError::malformed_payload(
            [(CLAIM_SP, sp.is_none()), (CLAIM_IDP, idp.is_none()), (CLAIM_TICKET, ticket.is_none())]
                .into_iter()
                .filter_map(|(name, missing)| missing.then_some(name)),
        )),
    }
}

/// Verifies a signed assertion against `keys` and extracts its claims.
///
/// # Verification steps
///
/// 1. Read the header algorithm.
/// 2. Reject `none` and HMAC algorithms.
/// 3. Select the trusted keys of the algorithm's family.
/// 4. Try each key in load order; the first that verifies wins.
/// 5. Require string `sp`, `idp` and `ticket` claims. An `exp` claim is honoured when present
///    but never required; a non-numeric `exp` makes the payload malformed.
///
/// # Errors
///
/// - [`AuthError::InvalidTokenFormat`] if the token is not a compact JWS.
/// - [`AuthError::UnsupportedAlgorithm`] for forbidden or unknown algorithms.
/// - [`AuthError::NoSuitableSigningKeys`] if no trusted key matches the algorithm family.
/// - [`AuthError::BadSignature`] if no candidate key verifies the signature.
/// - [`AuthError::TokenExpired`] if `exp` is present and past.
/// - [`AuthError::MalformedPayload`] if any claim is missing or not a string, or `exp` is not a
///   number.
///
/// # Example
///
/// ```no_run
/// use idpstat_authn::{KeyStore, assertion::unpack};
///
/// # fn example(token: &str, keys: &KeyStore) -> Result<(), idpstat_authn::AuthError> {
/// let claims = unpack(token, keys)?;
/// println!("{} chose {}", claims.sp, claims.idp);
/// # Ok(())
/// # }
/// ```
#[tracing::instrument(skip_all, fields(alg = tracing::field::Empty))]
pub fn unpack(token: &str, keys: &KeyStore) -> Result<AssertionClaims, AuthError> {
    let alg_name = header_algorithm(token)?;
    tracing::Span::current().record("alg", alg_name.as_str());

    let alg = validate_algorithm(&alg_name)?;
    let kind = key_kind_for(alg).ok_or_else(|| {
        AuthError::unsupported_algorithm(format!("Algorithm '{alg_name}' has no key family"))
    })?;

    let mut validation = Validation::new(alg);
    validation.required_spec_claims = HashSet::new();
    validation.validate_aud = false;

    let mut candidates = keys.keys_of(kind).peekable();
    if candidates.peek().is_none() {
        tracing::debug!(%kind, "no trusted key for algorithm family");
        return Err(AuthError::no_suitable_signing_keys(alg_name));
    }

    for key in candidates {
        match decode::<Value>(token, key.decoding_key(), &validation) {
            Ok(data) => {
                check_expiry(&data.claims, validation.leeway)?;
                return claims_from_payload(&data.claims);
            },
            Err(e) => match e.kind() {
                ErrorKind::InvalidSignature
                | ErrorKind::InvalidEcdsaKey
                | ErrorKind::InvalidRsaKey(_)
                | ErrorKind::InvalidKeyFormat => {
                    tracing::debug!(key = key.label(), "key did not verify assertion");
                },
                ErrorKind::ExpiredSignature => return Err(AuthError::token_expired()),
                ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
                    return Err(AuthError::malformed_payload([CLAIM_SP, CLAIM_IDP, CLAIM_TICKET]));
                },
                _ => return Err(AuthError::invalid_token_format(e.to_string())),
            },
        }
    }

    tracing::debug!("no trusted key verified assertion");
    Err(AuthError::bad_signature())
}
