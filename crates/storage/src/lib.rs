//! Ticket and call statistics storage for idpstat.
//!
//! This crate provides the [`StatStore`] trait and its implementations. The
//! stat service issues single-use tickets, redeems them exactly once, and
//! counts how often each identity provider (IdP) was chosen at each service
//! provider (SP). Everything it persists goes through this abstraction.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      idpstat service                        │
//! │     create_ticket │ register_call │ get_stat │ get_all_sp   │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    idpstat-storage                          │
//! │                    StatStore trait                          │
//! │  (save/consume ticket, upsert_and_increment, get_stat, …)   │
//! ├────────────────────────┬────────────────────────────────────┤
//! │   MemoryStatStore      │        SqliteStatStore             │
//! │  (testing, ephemeral)  │         (persistent)               │
//! └────────────────────────┴────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use chrono::Utc;
//! use idpstat_storage::{MemoryStatStore, StatStore, Ticket};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MemoryStatStore::new();
//!
//!     // Issue and redeem a ticket
//!     store.save_ticket(&Ticket::new("t-1", Utc::now())).await?;
//!     assert!(store.consume_ticket("t-1").await?.is_some());
//!
//!     // Count the call
//!     store.upsert_and_increment("https://sp.example.org", "https://idp.example.org").await?;
//!     let stats = store.get_stat("https://sp.example.org").await?;
//!     assert_eq!(stats[0].frequency, 1);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Available Stores
//!
//! | Store | Use Case | Persistence |
//! |-------|----------|-------------|
//! | [`MemoryStatStore`] | Testing, development | No |
//! | [`SqliteStatStore`] | Production | Yes |
//!
//! # Error Handling
//!
//! All operations return [`StorageResult<T>`]. Stores map their internal
//! errors to [`StorageError`] variants; empty names and tokens are rejected
//! with [`StorageError::Validation`] before any state is touched.
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module (name generators, pre-populated stores, assertion
//!   macros) and the `conformance` suite. Enable this in `[dev-dependencies]` for integration
//!   tests.

#![deny(unsafe_code)]

pub mod backend;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod conformance;
pub mod error;
pub mod memory;
pub mod sqlite;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
pub mod types;
pub mod validation;

// Re-export primary types at crate root for convenience
pub use backend::StatStore;
pub use error::{BoxError, StorageError, StorageResult};
pub use memory::MemoryStatStore;
pub use sqlite::SqliteStatStore;
pub use types::{IdpFrequency, IdpId, SpId, Ticket};
