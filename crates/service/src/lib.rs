//! # idpstat
//!
//! Counts which identity provider (IdP) users pick at each service provider
//! (SP), with every count authorized by a single-use ticket.
//!
//! ## Protocol
//!
//! 1. The SP asks for a ticket ([`StatApi::create_ticket`]) when a login starts.
//! 2. After the user has chosen an IdP, the SP signs an assertion carrying `sp`, `idp` and
//!    `ticket` with one of its private keys.
//! 3. The assertion is handed to [`StatApi::register_signed`]. The signature is checked against
//!    the trusted keys, the ticket is consumed, and the (sp, idp) counter goes up by one.
//!
//! A ticket is redeemed at most once, even under concurrent replays.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use idpstat::StatService;
//! use idpstat_storage::MemoryStatStore;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let service = StatService::new(Arc::new(MemoryStatStore::new()));
//!
//! for idp in ["https://b.example.org", "https://a.example.org", "https://b.example.org"] {
//!     let ticket = service.create_ticket().await?;
//!     service.register_call("https://sp.example.org", idp, &ticket).await?;
//! }
//!
//! let stats = service.get_stat("https://sp.example.org").await?;
//! assert_eq!(stats[0].idp, "https://b.example.org");
//! assert_eq!(stats[0].frequency, 2);
//! # Ok::<(), idpstat::StatError>(())
//! # }).unwrap();
//! ```
//!
//! ## Modules
//!
//! - [`api`]: [`StatApi`], the service plus assertion verification
//! - [`config`]: JSON configuration and store selection
//! - [`service`]: ticket lifecycle and statistics over a [`StatStore`]
//! - [`ticket`]: token generation

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod config;
pub mod error;
pub mod service;
pub mod ticket;

pub use api::StatApi;
pub use config::{StatConfig, StorageConfig};
pub use error::{Result, StatError, TicketRejection};
pub use idpstat_authn::{AssertionClaims, AuthError, KeyKind, KeySource, KeyStore};
pub use idpstat_storage::{IdpFrequency, MemoryStatStore, SqliteStatStore, StatStore};
pub use service::StatService;
