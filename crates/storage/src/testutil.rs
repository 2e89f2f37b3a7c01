//! Shared test utilities for stat store testing.
//!
//! This module provides helpers for generating SP/IdP names and tickets,
//! pre-populated stores, and assertion macros over [`StorageResult`] values.
//! It is feature-gated behind `testutil` to prevent leaking into production
//! builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! idpstat-storage = { path = "../storage", features = ["testutil"] }
//! ```
//!
//! Then import helpers:
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use idpstat_storage::testutil::{make_sp, make_idp, populated_store};
//! ```

use chrono::Utc;

use crate::{
    StatStore,
    error::{StorageError, StorageResult},
    memory::MemoryStatStore,
    types::Ticket,
};

/// Create a deterministic SP entity name, e.g. `https://sp-003.example.org`.
#[must_use]
pub fn make_sp(idx: usize) -> String {
    format!("https://sp-{idx:03}.example.org")
}

/// Create a deterministic IdP entity name, e.g. `https://idp-003.example.org`.
#[must_use]
pub fn make_idp(idx: usize) -> String {
    format!("https://idp-{idx:03}.example.org")
}

/// Create a ticket issued now with a deterministic token.
#[must_use]
pub fn make_ticket(idx: usize) -> Ticket {
    Ticket::new(format!("ticket-{idx:06}"), Utc::now())
}

/// Create a [`MemoryStatStore`] with the given calls already counted.
///
/// Each `(sp, idp, count)` entry is registered `count` times.
///
/// # Panics
///
/// Panics if any increment fails (should not happen with non-empty names).
pub async fn populated_store(calls: &[(&str, &str, u64)]) -> MemoryStatStore {
    let store = MemoryStatStore::new();
    for &(sp, idp, count) in calls {
        for _ in 0..count {
            store.upsert_and_increment(sp, idp).await.expect("populate increment failed");
        }
    }
    store
}

/// Assert that a [`StorageResult`] is an `Err` matching the given [`StorageError`] variant.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use idpstat_storage::assert_storage_error;
/// use idpstat_storage::error::{StorageError, StorageResult};
///
/// let result: StorageResult<()> = Err(StorageError::validation("sp", "empty"));
/// assert_storage_error!(result, Validation);
/// ```
#[macro_export]
macro_rules! assert_storage_error {
    ($result:expr, $variant:ident) => {{
        let result = &$result;
        assert!(
            matches!(result, Err($crate::error::StorageError::$variant { .. })),
            "expected StorageError::{}, got: {:?}",
            stringify!($variant),
            result,
        );
    }};
    ($result:expr, $variant:ident, $msg:expr) => {{
        let result = &$result;
        assert!(
            matches!(result, Err($crate::error::StorageError::$variant { .. })),
            "{}: expected StorageError::{}, got: {:?}",
            $msg,
            stringify!($variant),
            result,
        );
    }};
}

/// Assert that a [`StorageResult`] is `Ok`.
///
/// Returns the inner value on success, panics with a descriptive message
/// on failure.
#[macro_export]
macro_rules! assert_storage_ok {
    ($result:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("expected Ok, got StorageError: {e:?}"),
        }
    };
    ($result:expr, $msg:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("{}: expected Ok, got StorageError: {e:?}", $msg),
        }
    };
}

/// Returns the offending field name if `result` is a validation error.
pub fn validation_field<T>(result: &StorageResult<T>) -> Option<&str> {
    match result {
        Err(StorageError::Validation { field, .. }) => Some(field.as_str()),
        _ => None,
    }
}
