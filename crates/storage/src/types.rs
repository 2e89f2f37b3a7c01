//! Common types used across storage operations.
//!
//! This module defines the records a [`StatStore`](crate::StatStore) persists
//! and returns: tickets, per-IdP frequencies and the row identifiers of the
//! `sp` and `idp` relations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An issued, not yet redeemed ticket.
///
/// Tickets are created by the service on issuance and deleted exactly once
/// when a registration redeems them.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use idpstat_storage::Ticket;
///
/// let ticket = Ticket::new("opaque-token", Utc::now());
/// assert_eq!(ticket.token, "opaque-token");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Opaque, URL-safe token handed to the caller.
    pub token: String,

    /// When the ticket was issued.
    pub issued_at: DateTime<Utc>,
}

impl Ticket {
    /// Creates a ticket record.
    pub fn new(token: impl Into<String>, issued_at: DateTime<Utc>) -> Self {
        Self { token: token.into(), issued_at }
    }

    /// Returns `true` if the ticket was issued strictly before `cutoff`.
    #[must_use]
    pub fn issued_before(&self, cutoff: DateTime<Utc>) -> bool {
        self.issued_at < cutoff
    }
}

/// How often one IdP was chosen for a given SP.
///
/// Serializes as a two-element JSON array `["idp", frequency]`, the shape
/// statistics consumers already expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, u64)", into = "(String, u64)")]
pub struct IdpFrequency {
    /// IdP name.
    pub idp: String,

    /// Number of successful registrations of the (sp, idp) pair.
    pub frequency: u64,
}

impl IdpFrequency {
    /// Creates a new entry.
    pub fn new(idp: impl Into<String>, frequency: u64) -> Self {
        Self { idp: idp.into(), frequency }
    }
}

impl From<(String, u64)> for IdpFrequency {
    fn from((idp, frequency): (String, u64)) -> Self {
        Self { idp, frequency }
    }
}

impl From<IdpFrequency> for (String, u64) {
    fn from(entry: IdpFrequency) -> Self {
        (entry.idp, entry.frequency)
    }
}

/// Sorts statistics by frequency descending, breaking ties by IdP name.
pub(crate) fn sort_by_frequency(stats: &mut [IdpFrequency]) {
    stats.sort_by(|a, b| b.frequency.cmp(&a.frequency).then_with(|| a.idp.cmp(&b.idp)));
}

/// Macro to define a newtype wrapper around `i64` row identifiers.
///
/// Each generated type:
/// - Is a transparent wrapper around `i64` (zero runtime cost)
/// - Derives `Copy`, `Clone`, `Debug`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Implements `From<i64>` and `Into<i64>`
/// - Implements `Display` that outputs the inner value
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub i64);

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Row identifier in the `sp` relation.
    ///
    /// Wrapping the raw `i64` means passing an [`IdpId`] where an `SpId` is
    /// expected is a compile-time error.
    ///
    /// # Examples
    ///
    /// ```
    /// use idpstat_storage::SpId;
    ///
    /// let id = SpId::from(7);
    /// assert_eq!(i64::from(id), 7);
    /// assert_eq!(id.to_string(), "7");
    /// ```
    SpId
);

define_id!(
    /// Row identifier in the `idp` relation.
    IdpId
);
