//! Signed registrations through [`StatApi`], configuration loading and
//! store failures.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::{collections::BTreeSet, io::Write, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use idpstat::{
    AuthError, IdpFrequency, MemoryStatStore, StatApi, StatConfig, StatError, StatService,
    StatStore, TicketRejection,
};
use idpstat_authn::testutil::{
    craft_raw_jwt, fixture_key_sources, fixture_key_store, registration_claims, sign_with_fixture,
};
use idpstat_storage::{StorageError, StorageResult, Ticket};
use jsonwebtoken::Algorithm;
use rstest::rstest;
use serde_json::json;

const SP: &str = "https://sp.example.org";
const IDP: &str = "https://idp.example.org";

fn api() -> StatApi {
    StatApi::new(StatService::new(Arc::new(MemoryStatStore::new())), Arc::new(fixture_key_store()))
}

fn signed(private_key: &str, alg: Algorithm, ticket: &str) -> String {
    sign_with_fixture(private_key, alg, &registration_claims(SP, IDP, ticket))
}

// ===========================================================================
// Signed registration
// ===========================================================================

#[rstest]
#[case::rsa("rsa_private.pem", Algorithm::RS256)]
#[case::rsa_pss("rsa_private.pem", Algorithm::PS384)]
#[case::ec("ec_private.pem", Algorithm::ES256)]
#[case::ed25519("ed25519_private.pem", Algorithm::EdDSA)]
#[tokio::test]
async fn signed_registration_counts_call(#[case] private_key: &str, #[case] alg: Algorithm) {
    let api = api();
    let ticket = api.create_ticket().await.unwrap();

    let claims = api.register_signed(&signed(private_key, alg, &ticket)).await.unwrap();

    assert_eq!((claims.sp.as_str(), claims.idp.as_str()), (SP, IDP));
    assert_eq!(api.get_stat(SP).await.unwrap(), vec![IdpFrequency::new(IDP, 1)]);
    assert_eq!(api.outstanding_tickets().await.unwrap(), 0);
}

#[tokio::test]
async fn tampered_assertion_is_bad_signature() {
    let api = api();
    let ticket = api.create_ticket().await.unwrap();
    let token = signed("rsa_private.pem", Algorithm::RS256, &ticket);

    let mut parts: Vec<String> = token.split('.').map(str::to_owned).collect();
    let forged = registration_claims(SP, "https://evil.example.org", &ticket);
    parts[1] = craft_raw_jwt(&json!({"alg": "RS256"}), &forged)
        .split('.')
        .nth(1)
        .expect("payload segment")
        .to_owned();

    let result = api.register_signed(&parts.join(".")).await;
    assert!(matches!(result, Err(StatError::Auth(AuthError::BadSignature))), "{result:?}");
    assert_eq!(api.outstanding_tickets().await.unwrap(), 1, "ticket untouched");
    assert!(api.get_all_sp().await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_idp_is_malformed_payload() {
    let api = api();
    let ticket = api.create_ticket().await.unwrap();
    let token =
        sign_with_fixture("rsa_private.pem", Algorithm::RS256, &json!({"sp": SP, "ticket": ticket}));

    match api.register_signed(&token).await {
        Err(StatError::Auth(AuthError::MalformedPayload { missing })) => {
            assert_eq!(missing, vec!["idp"]);
        },
        other => panic!("expected MalformedPayload, got {other:?}"),
    }
    assert_eq!(api.outstanding_tickets().await.unwrap(), 1);
}

#[tokio::test]
async fn unsigned_assertion_is_rejected() {
    let api = api();
    let ticket = api.create_ticket().await.unwrap();
    let token = craft_raw_jwt(&json!({"alg": "none"}), &registration_claims(SP, IDP, &ticket));

    let result = api.register_signed(&token).await;
    assert!(matches!(result, Err(StatError::Auth(AuthError::UnsupportedAlgorithm(_)))));
    assert_eq!(result.unwrap_err().http_status(), 401);
}

#[tokio::test]
async fn empty_claim_is_validation_error() {
    let api = api();
    let ticket = api.create_ticket().await.unwrap();
    let token = sign_with_fixture(
        "rsa_private.pem",
        Algorithm::RS256,
        &registration_claims("", IDP, &ticket),
    );

    let result = api.register_signed(&token).await;
    assert!(matches!(result, Err(StatError::Validation { ref field, .. }) if field == "sp"));
    assert_eq!(api.outstanding_tickets().await.unwrap(), 1);
}

#[tokio::test]
async fn assertion_for_forged_ticket_is_invalid_ticket() {
    let api = api();
    let result = api.register_signed(&signed("rsa_private.pem", Algorithm::RS256, "forged")).await;
    assert!(matches!(result, Err(StatError::InvalidTicket { reason: TicketRejection::Unknown })));
}

// ===========================================================================
// Configuration
// ===========================================================================

#[tokio::test]
async fn api_from_json_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("stats.db");
    let config_json = json!({
        "keys": fixture_key_sources(),
        "storage": {"backend": "sqlite", "path": db_path},
        "ticket_ttl": "5m",
    });

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(config_json.to_string().as_bytes()).unwrap();

    let config = StatConfig::from_json_file(file.path()).unwrap();
    let api = StatApi::from_config(&config).unwrap();
    assert_eq!(api.keys().len(), 3);
    assert_eq!(api.service().ticket_ttl(), Some(std::time::Duration::from_secs(300)));

    let ticket = api.create_ticket().await.unwrap();
    api.register_signed(&signed("ec_private.pem", Algorithm::ES256, &ticket)).await.unwrap();
    drop(api);

    // Counts survive reopening the database.
    let reopened = StatApi::from_config(&config).unwrap();
    assert_eq!(reopened.get_stat(SP).await.unwrap(), vec![IdpFrequency::new(IDP, 1)]);
}

#[test]
fn api_from_config_with_missing_key_file() {
    let config = StatConfig::from_json_str(r#"{"keys": [{"path": "/nonexistent/key.pem"}]}"#)
        .unwrap();
    let result = StatApi::from_config(&config);
    assert!(matches!(result, Err(StatError::Auth(AuthError::KeyLoad { .. }))));
}

// ===========================================================================
// Store failures
// ===========================================================================

/// Delegates tickets to a memory store but cannot count calls.
struct CountingFails {
    inner: MemoryStatStore,
}

#[async_trait]
impl StatStore for CountingFails {
    async fn save_ticket(&self, ticket: &Ticket) -> StorageResult<()> {
        self.inner.save_ticket(ticket).await
    }

    async fn consume_ticket(&self, token: &str) -> StorageResult<Option<Ticket>> {
        self.inner.consume_ticket(token).await
    }

    async fn upsert_and_increment(&self, _sp: &str, _idp: &str) -> StorageResult<u64> {
        Err(StorageError::internal("statistics table unavailable"))
    }

    async fn get_stat(&self, sp: &str) -> StorageResult<Vec<IdpFrequency>> {
        self.inner.get_stat(sp).await
    }

    async fn get_all_sp(&self) -> StorageResult<BTreeSet<String>> {
        self.inner.get_all_sp().await
    }

    async fn purge_tickets_issued_before(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        self.inner.purge_tickets_issued_before(cutoff).await
    }

    async fn ticket_count(&self) -> StorageResult<u64> {
        self.inner.ticket_count().await
    }
}

#[tokio::test]
async fn failed_count_keeps_ticket_consumed() {
    let service = StatService::new(Arc::new(CountingFails { inner: MemoryStatStore::new() }));
    let ticket = service.create_ticket().await.unwrap();

    let result = service.register_call(SP, IDP, &ticket).await;
    assert!(matches!(result, Err(StatError::Storage(StorageError::Internal { .. }))), "{result:?}");
    assert_eq!(result.unwrap_err().http_status(), 500);

    let retry = service.register_call(SP, IDP, &ticket).await;
    assert!(matches!(retry, Err(StatError::InvalidTicket { reason: TicketRejection::Unknown })));
    assert!(service.get_stat(SP).await.unwrap().is_empty());
}
