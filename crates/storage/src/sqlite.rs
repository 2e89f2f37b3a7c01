//! `SQLite`-backed stat store.
//!
//! [`SqliteStatStore`] persists the four relations (`sp`, `idp`, `call_stat`,
//! `ticket`) in an embedded `SQLite` database. Atomicity comes from the
//! database rather than from application locks:
//!
//! - consuming a ticket is a single `DELETE … RETURNING`, so only one of many
//!   racing callers can observe the deleted row;
//! - incrementing a pair is an `INSERT … ON CONFLICT DO UPDATE` executed in the
//!   same transaction that upserts the SP and IdP rows.
//!
//! Each handle owns one connection behind a mutex. Statements run on tokio's
//! blocking pool, so a connection waiting out the busy timeout never stalls
//! an async worker. Several handles may open the same file; `SQLite` file
//! locking then serializes their writes.

// SQLite returns i64 for counts and frequencies, but they are always non-negative.
#![allow(clippy::cast_sign_loss)]

use std::{collections::BTreeSet, path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, TransactionBehavior, params};

use crate::{
    backend::StatStore,
    error::{StorageError, StorageResult},
    types::{IdpFrequency, Ticket, sort_by_frequency},
    validation::{FIELD_IDP, FIELD_SP, FIELD_TICKET, validate_fields},
};

/// Default busy timeout for file-backed databases (5 seconds).
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS sp (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS idp (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS call_stat (
    sp_id     INTEGER NOT NULL REFERENCES sp(id),
    idp_id    INTEGER NOT NULL REFERENCES idp(id),
    frequency INTEGER NOT NULL CHECK (frequency >= 1),
    UNIQUE (sp_id, idp_id)
);
CREATE TABLE IF NOT EXISTS ticket (
    token     TEXT NOT NULL UNIQUE,
    issued_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS ticket_issued_at ON ticket (issued_at);
";

/// [`StatStore`] backed by an embedded `SQLite` database.
///
/// # Cloning
///
/// Clones share the same connection.
///
/// # Example
///
/// ```
/// use idpstat_storage::{SqliteStatStore, StatStore};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let store = SqliteStatStore::in_memory().unwrap();
/// store.upsert_and_increment("https://sp.example.org", "https://idp.example.org").await.unwrap();
///
/// let stats = store.get_stat("https://sp.example.org").await.unwrap();
/// assert_eq!(stats[0].frequency, 1);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct SqliteStatStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStatStore {
    /// Opens (or creates) a database file and ensures the schema exists.
    ///
    /// The database runs in WAL mode with [`DEFAULT_BUSY_TIMEOUT`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the schema cannot be
    /// created.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "wal", |row| row.get(0))?;

        tracing::debug!(path = %path.display(), journal_mode = %mode, "opened sqlite stat store");
        Self::initialize(conn)
    }

    /// Creates a private in-memory database, mainly for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn in_memory() -> StorageResult<Self> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> StorageResult<Self> {
        conn.pragma_update(None, "foreign_keys", "on")?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Runs `f` against the connection on the blocking thread pool.
    async fn with_conn<T, F>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&mut Connection) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || f(&mut conn.lock()))
            .await
            .map_err(|e| StorageError::internal_with_source("sqlite task failed", e))?
    }
}

fn parse_issued_at(raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StorageError::serialization_with_source("invalid ticket timestamp", e))
}

/// Fixed-width RFC 3339 so that string comparison orders timestamps.
fn format_issued_at(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
}

#[async_trait]
impl StatStore for SqliteStatStore {
    #[tracing::instrument(skip(self, ticket))]
    async fn save_ticket(&self, ticket: &Ticket) -> StorageResult<()> {
        validate_fields(&[(FIELD_TICKET, ticket.token.as_str())])?;

        let token = ticket.token.clone();
        let issued_at = format_issued_at(ticket.issued_at);
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO ticket (token, issued_at) VALUES (?1, ?2)",
                params![token, issued_at],
            )?;
            Ok(())
        })
        .await
    }

    #[tracing::instrument(skip(self, token))]
    async fn consume_ticket(&self, token: &str) -> StorageResult<Option<Ticket>> {
        validate_fields(&[(FIELD_TICKET, token)])?;

        let token = token.to_owned();
        self.with_conn(move |conn| {
            let issued_at: Option<String> = conn
                .query_row(
                    "DELETE FROM ticket WHERE token = ?1 RETURNING issued_at",
                    params![token],
                    |row| row.get(0),
                )
                .optional()?;

            match issued_at {
                Some(raw) => Ok(Some(Ticket::new(token, parse_issued_at(&raw)?))),
                None => Ok(None),
            }
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn upsert_and_increment(&self, sp: &str, idp: &str) -> StorageResult<u64> {
        validate_fields(&[(FIELD_SP, sp), (FIELD_IDP, idp)])?;

        let (sp, idp) = (sp.to_owned(), idp.to_owned());
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            tx.execute(
                "INSERT INTO sp (name) VALUES (?1) ON CONFLICT(name) DO NOTHING",
                params![sp],
            )?;
            tx.execute(
                "INSERT INTO idp (name) VALUES (?1) ON CONFLICT(name) DO NOTHING",
                params![idp],
            )?;
            let frequency: i64 = tx.query_row(
                "INSERT INTO call_stat (sp_id, idp_id, frequency)
                 VALUES ((SELECT id FROM sp WHERE name = ?1), (SELECT id FROM idp WHERE name = ?2), 1)
                 ON CONFLICT(sp_id, idp_id) DO UPDATE SET frequency = frequency + 1
                 RETURNING frequency",
                params![sp, idp],
                |row| row.get(0),
            )?;

            tx.commit()?;
            Ok(frequency as u64)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn get_stat(&self, sp: &str) -> StorageResult<Vec<IdpFrequency>> {
        validate_fields(&[(FIELD_SP, sp)])?;

        let sp = sp.to_owned();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT idp.name, call_stat.frequency
                 FROM call_stat
                 INNER JOIN idp ON call_stat.idp_id = idp.id
                 INNER JOIN sp ON call_stat.sp_id = sp.id
                 WHERE sp.name = ?1
                 ORDER BY call_stat.frequency DESC, idp.name ASC",
            )?;
            let mut stats = stmt
                .query_map(params![sp], |row| {
                    let frequency: i64 = row.get(1)?;
                    Ok(IdpFrequency::new(row.get::<_, String>(0)?, frequency as u64))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            sort_by_frequency(&mut stats);
            Ok(stats)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn get_all_sp(&self) -> StorageResult<BTreeSet<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached("SELECT name FROM sp")?;
            let names: BTreeSet<String> =
                stmt.query_map([], |row| row.get::<_, String>(0))?.collect::<Result<_, _>>()?;
            Ok(names)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn purge_tickets_issued_before(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let cutoff = format_issued_at(cutoff);
        self.with_conn(move |conn| {
            let removed =
                conn.execute("DELETE FROM ticket WHERE issued_at < ?1", params![cutoff])?;
            Ok(removed as u64)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn ticket_count(&self) -> StorageResult<u64> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM ticket", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }
}
