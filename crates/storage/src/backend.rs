//! Storage capability set required by the stat service.
//!
//! This module defines the [`StatStore`] trait. It covers the two logical
//! stores the registration protocol needs:
//!
//! - **Ticket store**: outstanding tickets with their issuance time, with
//!   atomic consume-once semantics.
//! - **Statistics store**: per (sp, idp) call counters with race-free
//!   upsert-and-increment.
//!
//! # Implementing a Store
//!
//! 1. Implement the [`StatStore`] trait
//! 2. Call [`validate_fields`](crate::validation::validate_fields) before any mutation
//! 3. Map backend-specific errors to [`StorageError`](crate::StorageError)
//! 4. Run the [`conformance`](crate::conformance) suite against the new store
//!
//! See [`MemoryStatStore`](crate::MemoryStatStore) for a reference
//! implementation.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::StorageResult,
    types::{IdpFrequency, Ticket},
};

/// Persistence layer for tickets and SP/IdP call statistics.
///
/// Stores are expected to be thread-safe (`Send + Sync`) and shared between
/// many concurrent callers. No locks are exposed; all concurrency discipline
/// is internal to the implementation.
///
/// # Key Operations
///
/// | Method | Description |
/// |--------|-------------|
/// | [`save_ticket`](StatStore::save_ticket) | Persist a freshly issued ticket |
/// | [`consume_ticket`](StatStore::consume_ticket) | Atomically find-and-delete a ticket |
/// | [`upsert_and_increment`](StatStore::upsert_and_increment) | Count one call for an (sp, idp) pair |
/// | [`get_stat`](StatStore::get_stat) | IdP frequencies for one SP |
/// | [`get_all_sp`](StatStore::get_all_sp) | Every SP that received a call |
/// | [`purge_tickets_issued_before`](StatStore::purge_tickets_issued_before) | Drop stale tickets |
/// | [`ticket_count`](StatStore::ticket_count) | Number of outstanding tickets |
#[async_trait]
pub trait StatStore: Send + Sync {
    /// Persists a newly issued ticket.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Validation`](crate::StorageError::Validation) if the token is empty.
    /// - [`StorageError::Conflict`](crate::StorageError::Conflict) if a ticket with the same token
    ///   is already outstanding.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn save_ticket(&self, ticket: &Ticket) -> StorageResult<()>;

    /// Atomically removes a ticket and reports whether it existed.
    ///
    /// Lookup and removal happen as one step: when several callers race on
    /// the same token, exactly one receives `Some` and every other caller
    /// observes `None`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(ticket))` if the ticket was outstanding and is now consumed
    /// - `Ok(None)` if the token is unknown or was already consumed
    ///
    /// # Errors
    ///
    /// [`StorageError::Validation`](crate::StorageError::Validation) if the token is empty.
    #[must_use = "a consumed ticket must be acted upon"]
    async fn consume_ticket(&self, token: &str) -> StorageResult<Option<Ticket>>;

    /// Records one call for the (sp, idp) pair.
    ///
    /// Creates the SP, the IdP and the pair record (frequency 1) when they do
    /// not exist yet, otherwise increments the pair's frequency by one.
    /// Concurrent increments of the same pair never lose an update.
    ///
    /// # Returns
    ///
    /// The pair's frequency after the increment.
    ///
    /// # Errors
    ///
    /// [`StorageError::Validation`](crate::StorageError::Validation) if `sp` or `idp` is empty.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn upsert_and_increment(&self, sp: &str, idp: &str) -> StorageResult<u64>;

    /// Returns every IdP ever called for `sp`, most frequent first.
    ///
    /// Ties are ordered by IdP name. An unknown SP yields an empty list.
    ///
    /// # Errors
    ///
    /// [`StorageError::Validation`](crate::StorageError::Validation) if `sp` is empty.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get_stat(&self, sp: &str) -> StorageResult<Vec<IdpFrequency>>;

    /// Returns every SP that has received at least one call.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get_all_sp(&self) -> StorageResult<BTreeSet<String>>;

    /// Deletes all outstanding tickets issued strictly before `cutoff`.
    ///
    /// # Returns
    ///
    /// The number of tickets removed.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn purge_tickets_issued_before(&self, cutoff: DateTime<Utc>) -> StorageResult<u64>;

    /// Returns the number of outstanding (issued, unconsumed) tickets.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn ticket_count(&self) -> StorageResult<u64>;
}
