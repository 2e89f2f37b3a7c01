//! Public entry point combining the stat service with assertion verification.
//!
//! An SP front end calls [`StatApi::create_ticket`] when it starts a login,
//! embeds the ticket in a signed assertion, and the stat endpoint hands that
//! assertion to [`StatApi::register_signed`].

use std::{collections::BTreeSet, sync::Arc};

use idpstat_authn::{AssertionClaims, KeyStore, unpack};
use idpstat_storage::IdpFrequency;

use crate::{config::StatConfig, error::Result, service::StatService};

/// Stat service plus the trusted keys used to verify assertions.
///
/// Cheap to clone; clones share the store and the key set.
#[derive(Debug, Clone)]
pub struct StatApi {
    service: StatService,
    keys: Arc<KeyStore>,
}

impl StatApi {
    /// Combines an existing service with a key set.
    pub fn new(service: StatService, keys: Arc<KeyStore>) -> Self {
        Self { service, keys }
    }

    /// Loads the keys and opens the store named by `config`.
    ///
    /// # Errors
    ///
    /// - [`StatError::Auth`](crate::StatError::Auth) if a key cannot be loaded.
    /// - [`StatError::Storage`](crate::StatError::Storage) if the store cannot be opened.
    #[tracing::instrument(skip_all)]
    pub fn from_config(config: &StatConfig) -> Result<Self> {
        let keys = KeyStore::load(config.keys())?;
        let store = config.storage().open()?;

        let mut service = StatService::new(store);
        if let Some(ttl) = config.ticket_ttl() {
            service = service.with_ticket_ttl(ttl);
        }

        tracing::debug!(
            keys = keys.len(),
            storage = ?config.storage(),
            ticket_ttl = ?config.ticket_ttl(),
            "stat api ready"
        );
        Ok(Self::new(service, Arc::new(keys)))
    }

    /// The underlying service.
    #[must_use]
    pub fn service(&self) -> &StatService {
        &self.service
    }

    /// The trusted key set.
    #[must_use]
    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    /// Issues a new ticket. See [`StatService::create_ticket`].
    ///
    /// # Errors
    ///
    /// Returns [`StatError::Storage`](crate::StatError::Storage) if the store fails.
    pub async fn create_ticket(&self) -> Result<String> {
        self.service.create_ticket().await
    }

    /// Redeems `ticket` for one (sp, idp) call. See [`StatService::register_call`].
    ///
    /// # Errors
    ///
    /// See [`StatService::register_call`].
    pub async fn register_call(&self, sp: &str, idp: &str, ticket: &str) -> Result<()> {
        self.service.register_call(sp, idp, ticket).await
    }

    /// Per-IdP frequencies for `sp`. See [`StatService::get_stat`].
    ///
    /// # Errors
    ///
    /// See [`StatService::get_stat`].
    pub async fn get_stat(&self, sp: &str) -> Result<Vec<IdpFrequency>> {
        self.service.get_stat(sp).await
    }

    /// Every SP with at least one call. See [`StatService::get_all_sp`].
    ///
    /// # Errors
    ///
    /// Returns [`StatError::Storage`](crate::StatError::Storage) if the store fails.
    pub async fn get_all_sp(&self) -> Result<BTreeSet<String>> {
        self.service.get_all_sp().await
    }

    /// Verifies a signed assertion against the trusted keys and returns its
    /// claims. Nothing is written.
    ///
    /// # Errors
    ///
    /// Returns [`StatError::Auth`](crate::StatError::Auth) when verification fails.
    pub fn verify_and_unpack(&self, token: &str) -> Result<AssertionClaims> {
        Ok(unpack(token, &self.keys)?)
    }

    /// Verifies a signed assertion, then registers the call it carries.
    ///
    /// A rejected assertion never touches the ticket.
    ///
    /// # Errors
    ///
    /// - [`StatError::Auth`](crate::StatError::Auth) when verification fails.
    /// - Any error of [`StatService::register_call`].
    #[tracing::instrument(skip_all)]
    pub async fn register_signed(&self, token: &str) -> Result<AssertionClaims> {
        let claims = self.verify_and_unpack(token).inspect_err(|err| {
            tracing::debug!(error = %err, "assertion rejected");
        })?;
        self.service.register_call(&claims.sp, &claims.idp, &claims.ticket).await?;
        Ok(claims)
    }

    /// Removes expired tickets. See [`StatService::purge_expired_tickets`].
    ///
    /// # Errors
    ///
    /// Returns [`StatError::Storage`](crate::StatError::Storage) if the store fails.
    pub async fn purge_expired_tickets(&self) -> Result<u64> {
        self.service.purge_expired_tickets().await
    }

    /// Number of outstanding tickets. See [`StatService::outstanding_tickets`].
    ///
    /// # Errors
    ///
    /// Returns [`StatError::Storage`](crate::StatError::Storage) if the store fails.
    pub async fn outstanding_tickets(&self) -> Result<u64> {
        self.service.outstanding_tickets().await
    }
}
