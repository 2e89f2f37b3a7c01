//! Ticket token generation.
//!
//! A token is the URL-safe base64 (no padding) encoding of a SHA-512 digest
//! over a fresh UUIDv4 URN, the current time in nanoseconds and 1024 bits
//! from the operating system RNG. The digest hides the inputs, and the random
//! bits alone make collisions and guessing negligible.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha512};
use uuid::Uuid;

/// Random bytes mixed into every token (1024 bits).
pub const RANDOM_SEED_BYTES: usize = 128;

/// Length of every generated token: 64 digest bytes in unpadded base64.
pub const TOKEN_LEN: usize = 86;

/// Generates a new unpredictable ticket token.
///
/// # Examples
///
/// ```
/// use idpstat::ticket::{TOKEN_LEN, generate_token};
///
/// let token = generate_token();
/// assert_eq!(token.len(), TOKEN_LEN);
/// assert_ne!(token, generate_token());
/// ```
#[must_use]
pub fn generate_token() -> String {
    let mut random = [0u8; RANDOM_SEED_BYTES];
    OsRng.fill_bytes(&mut random);

    let urn = Uuid::new_v4().urn().to_string();
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    derive_token(&urn, nanos, &random)
}

/// Hashes the seed material into a token.
fn derive_token(urn: &str, nanos: i64, random: &[u8]) -> String {
    let mut hasher = Sha512::new();
    hasher.update(urn.as_bytes());
    hasher.update(nanos.to_be_bytes());
    hasher.update(random);
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;

    fn is_url_safe(token: &str) -> bool {
        token.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    }

    #[test]
    fn test_generated_tokens_are_url_safe_and_fixed_length() {
        let token = generate_token();
        assert_eq!(token.len(), TOKEN_LEN);
        assert!(is_url_safe(&token), "token not URL-safe: {token}");
    }

    #[test]
    fn test_generated_tokens_do_not_repeat() {
        let tokens: HashSet<String> = (0..1000).map(|_| generate_token()).collect();
        assert_eq!(tokens.len(), 1000);
    }

    #[test]
    fn test_derive_token_is_deterministic() {
        let random = [9u8; RANDOM_SEED_BYTES];
        assert_eq!(
            derive_token("urn:uuid:00000000-0000-4000-8000-000000000000", 1, &random),
            derive_token("urn:uuid:00000000-0000-4000-8000-000000000000", 1, &random)
        );
    }

    proptest! {
        #[test]
        fn prop_token_shape(
            urn in "urn:uuid:[0-9a-f-]{36}",
            nanos in any::<i64>(),
            random in proptest::collection::vec(any::<u8>(), RANDOM_SEED_BYTES),
        ) {
            let token = derive_token(&urn, nanos, &random);
            prop_assert_eq!(token.len(), TOKEN_LEN);
            prop_assert!(is_url_safe(&token));
        }

        #[test]
        fn prop_random_bits_change_token(
            random in proptest::collection::vec(any::<u8>(), RANDOM_SEED_BYTES),
            flip in 0..RANDOM_SEED_BYTES,
        ) {
            let mut other = random.clone();
            other[flip] ^= 0x01;
            prop_assert_ne!(derive_token("urn", 0, &random), derive_token("urn", 0, &other));
        }
    }
}
