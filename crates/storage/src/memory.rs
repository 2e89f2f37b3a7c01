//! In-memory stat store implementation.
//!
//! This module provides [`MemoryStatStore`], an in-memory implementation of
//! [`StatStore`] suitable for testing, development and single-process
//! deployments that accept losing statistics on restart.
//!
//! # Layout
//!
//! The store mirrors the relational layout of the persistent backends:
//!
//! | Table | Key | Value |
//! |-------|-----|-------|
//! | `sp` | name | [`SpId`] |
//! | `idp` | name | [`IdpId`] |
//! | `call_stat` | ([`SpId`], [`IdpId`]) | frequency |
//! | `ticket` | token | issued at |
//!
//! All tables live behind a single [`parking_lot::RwLock`]. Every mutation
//! takes the write lock once, so consume and increment are atomic with
//! respect to each other and to concurrent callers.
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use idpstat_storage::{MemoryStatStore, StatStore, Ticket};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemoryStatStore::new();
//!
//!     store.save_ticket(&Ticket::new("t-1", Utc::now())).await.unwrap();
//!     assert!(store.consume_ticket("t-1").await.unwrap().is_some());
//!     assert!(store.consume_ticket("t-1").await.unwrap().is_none());
//! }
//! ```

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::{
    backend::StatStore,
    error::{StorageError, StorageResult},
    types::{IdpFrequency, IdpId, SpId, Ticket, sort_by_frequency},
    validation::{FIELD_IDP, FIELD_SP, FIELD_TICKET, validate_fields},
};

/// The four relations, guarded together.
#[derive(Debug, Default)]
struct Tables {
    sp: HashMap<String, SpId>,
    idp: HashMap<String, IdpId>,
    call_stat: HashMap<(SpId, IdpId), u64>,
    ticket: HashMap<String, DateTime<Utc>>,
    next_sp_id: i64,
    next_idp_id: i64,
}

impl Tables {
    fn sp_id_or_insert(&mut self, name: &str) -> SpId {
        if let Some(id) = self.sp.get(name) {
            return *id;
        }
        self.next_sp_id += 1;
        let id = SpId::from(self.next_sp_id);
        self.sp.insert(name.to_owned(), id);
        id
    }

    fn idp_id_or_insert(&mut self, name: &str) -> IdpId {
        if let Some(id) = self.idp.get(name) {
            return *id;
        }
        self.next_idp_id += 1;
        let id = IdpId::from(self.next_idp_id);
        self.idp.insert(name.to_owned(), id);
        id
    }
}

/// In-memory [`StatStore`].
///
/// # Cloning
///
/// `MemoryStatStore` is cheaply cloneable via [`Arc`]. All clones share the
/// same underlying tables.
#[derive(Debug, Default, Clone)]
pub struct MemoryStatStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStatStore {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatStore for MemoryStatStore {
    #[tracing::instrument(skip(self, ticket))]
    async fn save_ticket(&self, ticket: &Ticket) -> StorageResult<()> {
        validate_fields(&[(FIELD_TICKET, ticket.token.as_str())])?;

        let mut tables = self.tables.write();
        if tables.ticket.contains_key(&ticket.token) {
            return Err(StorageError::conflict("ticket already outstanding"));
        }
        tables.ticket.insert(ticket.token.clone(), ticket.issued_at);
        Ok(())
    }

    #[tracing::instrument(skip(self, token))]
    async fn consume_ticket(&self, token: &str) -> StorageResult<Option<Ticket>> {
        validate_fields(&[(FIELD_TICKET, token)])?;

        let mut tables = self.tables.write();
        Ok(tables.ticket.remove(token).map(|issued_at| Ticket::new(token, issued_at)))
    }

    #[tracing::instrument(skip(self))]
    async fn upsert_and_increment(&self, sp: &str, idp: &str) -> StorageResult<u64> {
        validate_fields(&[(FIELD_SP, sp), (FIELD_IDP, idp)])?;

        let mut tables = self.tables.write();
        let sp_id = tables.sp_id_or_insert(sp);
        let idp_id = tables.idp_id_or_insert(idp);

        let frequency = tables.call_stat.entry((sp_id, idp_id)).or_insert(0);
        *frequency += 1;
        Ok(*frequency)
    }

    #[tracing::instrument(skip(self))]
    async fn get_stat(&self, sp: &str) -> StorageResult<Vec<IdpFrequency>> {
        validate_fields(&[(FIELD_SP, sp)])?;

        let tables = self.tables.read();
        let Some(&sp_id) = tables.sp.get(sp) else {
            return Ok(Vec::new());
        };

        let mut stats: Vec<IdpFrequency> = tables
            .idp
            .iter()
            .filter_map(|(name, idp_id)| {
                tables
                    .call_stat
                    .get(&(sp_id, *idp_id))
                    .map(|frequency| IdpFrequency::new(name.clone(), *frequency))
            })
            .collect();

        sort_by_frequency(&mut stats);
        Ok(stats)
    }

    #[tracing::instrument(skip(self))]
    async fn get_all_sp(&self) -> StorageResult<BTreeSet<String>> {
        let tables = self.tables.read();
        Ok(tables.sp.keys().cloned().collect())
    }

    #[tracing::instrument(skip(self))]
    async fn purge_tickets_issued_before(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let mut tables = self.tables.write();
        let before = tables.ticket.len();
        tables.ticket.retain(|_, issued_at| *issued_at >= cutoff);
        Ok((before - tables.ticket.len()) as u64)
    }

    #[tracing::instrument(skip(self))]
    async fn ticket_count(&self) -> StorageResult<u64> {
        Ok(self.tables.read().ticket.len() as u64)
    }
}
