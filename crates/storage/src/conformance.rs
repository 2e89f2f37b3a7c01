//! Conformance test suite for [`StatStore`] implementations.
//!
//! This module provides a set of async test functions that validate whether
//! a [`StatStore`] implementation satisfies the trait contract. Every store,
//! whether in-memory, `SQLite`-backed or third-party, can run the same suite.
//!
//! # Usage
//!
//! Enable the `testutil` feature and call each conformance function with
//! a fresh store instance:
//!
//! ```no_run
//! use idpstat_storage::conformance;
//! use idpstat_storage::MemoryStatStore;
//!
//! #[tokio::test]
//! async fn ticket_consume_unknown_returns_none() {
//!     conformance::ticket_consume_unknown_returns_none(&MemoryStatStore::new()).await;
//! }
//! ```
//!
//! # Test Categories
//!
//! | Category | Contract aspect |
//! |----------|-----------------|
//! | Ticket | Save, consume-once, purge |
//! | Stat | Upsert-and-increment, ordering, SP listing |
//! | Validation | Empty fields rejected without side effects |
//! | Concurrent | Exactly-one consume winner, no lost increments |

use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::task::JoinSet;

use crate::{
    assert_storage_error,
    backend::StatStore,
    types::{IdpFrequency, Ticket},
};

// ============================================================================
// Ticket: save, consume-once, purge
// ============================================================================

/// Consuming a token that was never issued returns `Ok(None)`.
pub async fn ticket_consume_unknown_returns_none<S: StatStore>(store: &S) {
    let result = store.consume_ticket("never-issued").await;
    assert!(result.is_ok(), "consume should not error on unknown token: {result:?}");
    assert_eq!(result.expect("checked above"), None);
}

/// A saved ticket is consumed once, with its issuance time intact.
pub async fn ticket_save_then_consume_once<S: StatStore>(store: &S) {
    let issued_at = Utc::now();
    store.save_ticket(&Ticket::new("once", issued_at)).await.expect("save");
    assert_eq!(store.ticket_count().await.expect("count"), 1);

    let first = store.consume_ticket("once").await.expect("first consume");
    assert_eq!(first, Some(Ticket::new("once", issued_at)));

    let second = store.consume_ticket("once").await.expect("second consume");
    assert_eq!(second, None, "a ticket must not be consumable twice");
    assert_eq!(store.ticket_count().await.expect("count"), 0);
}

/// Saving a token that is already outstanding is a conflict.
pub async fn ticket_duplicate_save_conflicts<S: StatStore>(store: &S) {
    let ticket = Ticket::new("dup", Utc::now());
    store.save_ticket(&ticket).await.expect("first save");
    let result = store.save_ticket(&ticket).await;
    assert_storage_error!(result, Conflict);
}

/// Consuming one ticket leaves the others outstanding.
pub async fn ticket_consume_is_per_token<S: StatStore>(store: &S) {
    store.save_ticket(&Ticket::new("a", Utc::now())).await.expect("save a");
    store.save_ticket(&Ticket::new("b", Utc::now())).await.expect("save b");

    assert!(store.consume_ticket("a").await.expect("consume a").is_some());
    assert!(store.consume_ticket("b").await.expect("consume b").is_some());
}

/// Purging removes only tickets issued strictly before the cutoff.
pub async fn ticket_purge_removes_only_older<S: StatStore>(store: &S) {
    let now = Utc::now();
    store.save_ticket(&Ticket::new("stale", now - Duration::hours(2))).await.expect("save stale");
    store.save_ticket(&Ticket::new("fresh", now)).await.expect("save fresh");

    let removed = store.purge_tickets_issued_before(now - Duration::hours(1)).await.expect("purge");
    assert_eq!(removed, 1);
    assert_eq!(store.consume_ticket("stale").await.expect("consume stale"), None);
    assert!(store.consume_ticket("fresh").await.expect("consume fresh").is_some());
}

/// Purging an empty ticket table is a no-op.
pub async fn ticket_purge_empty_is_noop<S: StatStore>(store: &S) {
    let removed = store.purge_tickets_issued_before(Utc::now()).await.expect("purge");
    assert_eq!(removed, 0);
}

// ============================================================================
// Stat: upsert-and-increment, ordering, SP listing
// ============================================================================

/// The first call for a pair creates it with frequency 1, later calls add one.
pub async fn stat_first_call_creates_pair<S: StatStore>(store: &S) {
    assert_eq!(store.upsert_and_increment("sp", "idp").await.expect("first"), 1);
    assert_eq!(store.upsert_and_increment("sp", "idp").await.expect("second"), 2);
    assert_eq!(store.get_stat("sp").await.expect("get_stat"), vec![IdpFrequency::new("idp", 2)]);
}

/// `get_stat` orders by frequency descending, then by IdP name.
pub async fn stat_ordered_by_frequency_then_name<S: StatStore>(store: &S) {
    for (idp, times) in [("idp-c", 1), ("idp-a", 3), ("idp-b", 1)] {
        for _ in 0..times {
            store.upsert_and_increment("sp", idp).await.expect("increment");
        }
    }

    let stats = store.get_stat("sp").await.expect("get_stat");
    assert_eq!(
        stats,
        vec![
            IdpFrequency::new("idp-a", 3),
            IdpFrequency::new("idp-b", 1),
            IdpFrequency::new("idp-c", 1),
        ]
    );
}

/// Counters are kept per (sp, idp) pair, not per IdP.
pub async fn stat_pairs_are_independent<S: StatStore>(store: &S) {
    store.upsert_and_increment("sp-1", "idp").await.expect("sp-1");
    store.upsert_and_increment("sp-1", "idp").await.expect("sp-1");
    store.upsert_and_increment("sp-2", "idp").await.expect("sp-2");

    assert_eq!(store.get_stat("sp-1").await.expect("sp-1"), vec![IdpFrequency::new("idp", 2)]);
    assert_eq!(store.get_stat("sp-2").await.expect("sp-2"), vec![IdpFrequency::new("idp", 1)]);
}

/// An SP that never received a call yields an empty list, not an error.
pub async fn stat_unknown_sp_is_empty<S: StatStore>(store: &S) {
    let stats = store.get_stat("nobody").await.expect("get_stat");
    assert!(stats.is_empty());
}

/// `get_all_sp` lists every SP exactly once.
pub async fn stat_all_sp_lists_each_once<S: StatStore>(store: &S) {
    assert!(store.get_all_sp().await.expect("empty").is_empty());

    store.upsert_and_increment("sp-b", "idp").await.expect("b");
    store.upsert_and_increment("sp-a", "idp").await.expect("a");
    store.upsert_and_increment("sp-a", "other").await.expect("a again");

    let all: Vec<String> = store.get_all_sp().await.expect("all").into_iter().collect();
    assert_eq!(all, vec!["sp-a".to_owned(), "sp-b".to_owned()]);
}

// ============================================================================
// Validation: empty fields rejected without side effects
// ============================================================================

/// Empty names and tokens are rejected before any write.
pub async fn validation_rejects_empty_fields<S: StatStore>(store: &S) {
    assert_storage_error!(store.upsert_and_increment("", "idp").await, Validation);
    assert_storage_error!(store.upsert_and_increment("sp", "").await, Validation);
    assert_storage_error!(store.get_stat("").await, Validation);
    assert_storage_error!(store.save_ticket(&Ticket::new("", Utc::now())).await, Validation);
    assert_storage_error!(store.consume_ticket("").await, Validation);

    assert!(store.get_all_sp().await.expect("all").is_empty(), "rejected calls must not create SPs");
    assert_eq!(store.ticket_count().await.expect("count"), 0);
}

// ============================================================================
// Concurrent: thread-safety under parallel access
// ============================================================================

/// Many tasks consuming the same ticket: exactly one wins.
///
/// Requires `S: 'static` so the store can be shared across spawned tasks
/// via `Arc`.
pub async fn concurrent_consume_exactly_one_winner<S: StatStore + 'static>(store: Arc<S>) {
    store.save_ticket(&Ticket::new("contested", Utc::now())).await.expect("save");

    let mut set = JoinSet::new();
    for _ in 0..32 {
        let store = Arc::clone(&store);
        set.spawn(async move { store.consume_ticket("contested").await });
    }

    let mut winners = 0u32;
    while let Some(joined) = set.join_next().await {
        if joined.expect("task join").expect("consume").is_some() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1, "exactly one consumer should observe the ticket");
}

/// Many tasks incrementing the same pair: no update is lost.
pub async fn concurrent_increments_are_not_lost<S: StatStore + 'static>(store: Arc<S>) {
    const TASKS: u64 = 64;

    let mut set = JoinSet::new();
    for _ in 0..TASKS {
        let store = Arc::clone(&store);
        set.spawn(async move { store.upsert_and_increment("race-sp", "race-idp").await });
    }
    while let Some(joined) = set.join_next().await {
        joined.expect("task join").expect("increment");
    }

    let stats = store.get_stat("race-sp").await.expect("get_stat");
    assert_eq!(stats, vec![IdpFrequency::new("race-idp", TASKS)]);
}

// ============================================================================
// Convenience runner
// ============================================================================

/// Run the full conformance suite, giving each check a fresh store.
///
/// ```no_run
/// use idpstat_storage::conformance;
/// use idpstat_storage::MemoryStatStore;
///
/// #[tokio::test]
/// async fn memory_store_conformance() {
///     conformance::run_all(MemoryStatStore::new).await;
/// }
/// ```
pub async fn run_all<S, F>(make: F)
where
    S: StatStore + 'static,
    F: Fn() -> S,
{
    // Ticket
    ticket_consume_unknown_returns_none(&make()).await;
    ticket_save_then_consume_once(&make()).await;
    ticket_duplicate_save_conflicts(&make()).await;
    ticket_consume_is_per_token(&make()).await;
    ticket_purge_removes_only_older(&make()).await;
    ticket_purge_empty_is_noop(&make()).await;

    // Stat
    stat_first_call_creates_pair(&make()).await;
    stat_ordered_by_frequency_then_name(&make()).await;
    stat_pairs_are_independent(&make()).await;
    stat_unknown_sp_is_empty(&make()).await;
    stat_all_sp_lists_each_once(&make()).await;

    // Validation
    validation_rejects_empty_fields(&make()).await;

    // Concurrent
    concurrent_consume_exactly_one_winner(Arc::new(make())).await;
    concurrent_increments_are_not_lost(Arc::new(make())).await;
}
