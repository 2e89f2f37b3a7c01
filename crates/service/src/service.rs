//! The stat service: ticket issuance, redemption and statistics.
//!
//! # Ticket lifecycle
//!
//! ```text
//! create_ticket ──► ISSUED ──register_call──► CONSUMED
//!                     │
//!                     └── purge_expired_tickets (only with a TTL)
//! ```
//!
//! A ticket authorizes exactly one registration. Redemption consumes the
//! ticket before the call is counted: if counting fails afterwards the call
//! is lost, but the ticket can never be redeemed a second time.

use std::{collections::BTreeSet, fmt, sync::Arc, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use idpstat_storage::{
    IdpFrequency, StatStore, Ticket,
    validation::{FIELD_IDP, FIELD_SP, FIELD_TICKET, validate_fields},
};

use crate::{
    error::{Result, StatError, TicketRejection},
    ticket::generate_token,
};

/// Orchestrates the registration protocol over an injected [`StatStore`].
///
/// # Cloning
///
/// Clones share the same store.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use idpstat::StatService;
/// use idpstat_storage::MemoryStatStore;
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let service = StatService::new(Arc::new(MemoryStatStore::new()));
///
/// let ticket = service.create_ticket().await.unwrap();
/// service.register_call("https://sp.example.org", "https://idp.example.org", &ticket).await.unwrap();
///
/// let stats = service.get_stat("https://sp.example.org").await.unwrap();
/// assert_eq!(stats[0].frequency, 1);
///
/// // Tickets are single-use.
/// assert!(service.register_call("https://sp.example.org", "https://idp.example.org", &ticket).await.is_err());
/// # });
/// ```
#[derive(Clone)]
pub struct StatService {
    store: Arc<dyn StatStore>,
    ticket_ttl: Option<Duration>,
}

impl StatService {
    /// Creates a service whose tickets never expire.
    pub fn new(store: Arc<dyn StatStore>) -> Self {
        Self { store, ticket_ttl: None }
    }

    /// Sets the ticket lifetime. Tickets older than `ttl` are rejected on
    /// redemption and removed by [`purge_expired_tickets`](Self::purge_expired_tickets).
    #[must_use]
    pub fn with_ticket_ttl(mut self, ttl: Duration) -> Self {
        self.ticket_ttl = Some(ttl);
        self
    }

    /// Configured ticket lifetime, if any.
    #[must_use]
    pub fn ticket_ttl(&self) -> Option<Duration> {
        self.ticket_ttl
    }

    /// Tickets issued strictly before the returned instant are expired.
    fn expiry_cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let ttl = TimeDelta::from_std(self.ticket_ttl?).ok()?;
        now.checked_sub_signed(ttl)
    }

    /// Issues a new ticket.
    ///
    /// # Errors
    ///
    /// Returns [`StatError::Storage`] if the ticket cannot be persisted.
    #[tracing::instrument(skip(self))]
    pub async fn create_ticket(&self) -> Result<String> {
        let token = generate_token();
        self.store.save_ticket(&Ticket::new(token.clone(), Utc::now())).await?;
        Ok(token)
    }

    /// Redeems `ticket` and counts one call for the (sp, idp) pair.
    ///
    /// All three values are validated before the ticket is touched, so a
    /// rejected call leaves the ticket redeemable.
    ///
    /// # Errors
    ///
    /// - [`StatError::Validation`] if any value is empty.
    /// - [`StatError::InvalidTicket`] if the ticket is unknown, already redeemed or expired.
    /// - [`StatError::Storage`] if the store fails.
    #[tracing::instrument(skip(self, ticket))]
    pub async fn register_call(&self, sp: &str, idp: &str, ticket: &str) -> Result<()> {
        validate_fields(&[(FIELD_SP, sp), (FIELD_IDP, idp), (FIELD_TICKET, ticket)])?;

        let Some(consumed) = self.store.consume_ticket(ticket).await? else {
            tracing::debug!(reason = %TicketRejection::Unknown, "ticket rejected");
            return Err(StatError::invalid_ticket(TicketRejection::Unknown));
        };

        if let Some(cutoff) = self.expiry_cutoff(Utc::now())
            && consumed.issued_before(cutoff)
        {
            tracing::debug!(
                reason = %TicketRejection::Expired,
                issued_at = %consumed.issued_at,
                "ticket rejected"
            );
            return Err(StatError::invalid_ticket(TicketRejection::Expired));
        }

        let frequency = self.store.upsert_and_increment(sp, idp).await?;
        tracing::debug!(frequency, "call registered");
        Ok(())
    }

    /// Every IdP called for `sp`, most frequent first. Unknown SPs yield an
    /// empty list.
    ///
    /// # Errors
    ///
    /// - [`StatError::Validation`] if `sp` is empty.
    /// - [`StatError::Storage`] if the store fails.
    #[tracing::instrument(skip(self))]
    pub async fn get_stat(&self, sp: &str) -> Result<Vec<IdpFrequency>> {
        Ok(self.store.get_stat(sp).await?)
    }

    /// Every SP that has received at least one call.
    ///
    /// # Errors
    ///
    /// Returns [`StatError::Storage`] if the store fails.
    #[tracing::instrument(skip(self))]
    pub async fn get_all_sp(&self) -> Result<BTreeSet<String>> {
        Ok(self.store.get_all_sp().await?)
    }

    /// Removes tickets older than the TTL and returns how many were removed.
    ///
    /// Without a TTL this is a no-op returning `0`. Callers decide when to
    /// run it; the service schedules nothing itself.
    ///
    /// # Errors
    ///
    /// Returns [`StatError::Storage`] if the store fails.
    #[tracing::instrument(skip(self))]
    pub async fn purge_expired_tickets(&self) -> Result<u64> {
        let Some(cutoff) = self.expiry_cutoff(Utc::now()) else {
            return Ok(0);
        };
        let removed = self.store.purge_tickets_issued_before(cutoff).await?;
        tracing::debug!(removed, "purged expired tickets");
        Ok(removed)
    }

    /// Number of issued, not yet redeemed tickets.
    ///
    /// # Errors
    ///
    /// Returns [`StatError::Storage`] if the store fails.
    pub async fn outstanding_tickets(&self) -> Result<u64> {
        Ok(self.store.ticket_count().await?)
    }
}

impl fmt::Debug for StatService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatService").field("ticket_ttl", &self.ticket_ttl).finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use idpstat_storage::MemoryStatStore;

    use super::*;

    fn service() -> (StatService, MemoryStatStore) {
        let store = MemoryStatStore::new();
        (StatService::new(Arc::new(store.clone())), store)
    }

    #[tokio::test]
    async fn test_create_ticket_persists_it() {
        let (service, _) = service();
        service.create_ticket().await.unwrap();
        service.create_ticket().await.unwrap();
        assert_eq!(service.outstanding_tickets().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_unknown_ticket_rejected() {
        let (service, _) = service();
        let result = service.register_call("sp", "idp", "forged").await;
        assert!(matches!(
            result,
            Err(StatError::InvalidTicket { reason: TicketRejection::Unknown })
        ));
        assert!(service.get_all_sp().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_ticket_is_validation_error() {
        let (service, _) = service();
        let result = service.register_call("sp", "idp", "").await;
        assert!(matches!(result, Err(StatError::Validation { ref field, .. }) if field == "ticket"));
    }

    #[tokio::test]
    async fn test_expired_ticket_rejected_and_consumed() {
        let (service, store) = service();
        let service = service.with_ticket_ttl(Duration::from_secs(60));
        let issued_at = Utc::now() - TimeDelta::minutes(5);
        store.save_ticket(&Ticket::new("stale", issued_at)).await.unwrap();

        let result = service.register_call("sp", "idp", "stale").await;
        assert!(matches!(
            result,
            Err(StatError::InvalidTicket { reason: TicketRejection::Expired })
        ));
        assert_eq!(service.outstanding_tickets().await.unwrap(), 0, "ticket stays consumed");
        assert!(service.get_stat("sp").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ticket_within_ttl_accepted() {
        let (service, _) = service();
        let service = service.with_ticket_ttl(Duration::from_secs(600));
        let ticket = service.create_ticket().await.unwrap();
        service.register_call("sp", "idp", &ticket).await.unwrap();
    }

    #[tokio::test]
    async fn test_without_ttl_old_tickets_remain_valid() {
        let (service, store) = service();
        store.save_ticket(&Ticket::new("ancient", Utc::now() - TimeDelta::days(365))).await.unwrap();

        assert_eq!(service.purge_expired_tickets().await.unwrap(), 0);
        service.register_call("sp", "idp", "ancient").await.unwrap();
    }

    #[tokio::test]
    async fn test_purge_expired_tickets() {
        let (service, store) = service();
        let service = service.with_ticket_ttl(Duration::from_secs(60));
        store.save_ticket(&Ticket::new("stale", Utc::now() - TimeDelta::minutes(5))).await.unwrap();
        let fresh = service.create_ticket().await.unwrap();

        assert_eq!(service.purge_expired_tickets().await.unwrap(), 1);
        assert_eq!(service.outstanding_tickets().await.unwrap(), 1);
        service.register_call("sp", "idp", &fresh).await.unwrap();
    }

    #[test]
    fn test_huge_ttl_never_expires() {
        let (service, _) = service();
        let service = service.with_ticket_ttl(Duration::MAX);
        assert_eq!(service.expiry_cutoff(Utc::now()), None);
    }

    #[test]
    fn test_debug_shows_ttl() {
        let (service, _) = service();
        let debug = format!("{:?}", service.with_ticket_ttl(Duration::from_secs(1)));
        assert!(debug.contains("ticket_ttl"));
    }
}
