//! Configuration for the stat service.
//!
//! [`StatConfig`] names the trusted verification keys, the store backend and
//! the optional ticket lifetime. It is usually read from a JSON file:
//!
//! ```json
//! {
//!   "keys": [
//!     { "path": "/etc/idpstat/signer.pem" },
//!     { "path": "/etc/idpstat/backup.pem", "kind": "ed25519" }
//!   ],
//!   "storage": { "backend": "sqlite", "path": "/var/lib/idpstat/stats.db" },
//!   "ticket_ttl": "10m"
//! }
//! ```

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use idpstat_authn::KeySource;
use idpstat_storage::{MemoryStatStore, SqliteStatStore, StatStore};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StatError};

/// Where statistics and tickets are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-process tables, lost on restart.
    #[default]
    Memory,
    /// `SQLite` database file, created if missing.
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
}

impl StorageConfig {
    /// Opens the configured store.
    ///
    /// # Errors
    ///
    /// Returns [`StatError::Storage`] if the database cannot be opened.
    pub fn open(&self) -> Result<Arc<dyn StatStore>> {
        Ok(match self {
            Self::Memory => Arc::new(MemoryStatStore::new()),
            Self::Sqlite { path } => Arc::new(SqliteStatStore::open(path)?),
        })
    }
}

/// Stat service configuration.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use idpstat::config::{StatConfig, StorageConfig};
/// use idpstat_authn::{KeyKind, KeySource};
///
/// let config = StatConfig::builder()
///     .keys(vec![KeySource::new("/etc/idpstat/signer.pem", KeyKind::Rsa)])
///     .storage(StorageConfig::Sqlite { path: "/var/lib/idpstat/stats.db".into() })
///     .ticket_ttl(Duration::from_secs(600))
///     .build()?;
///
/// assert_eq!(config.ticket_ttl(), Some(Duration::from_secs(600)));
/// # Ok::<(), idpstat::StatError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatConfig {
    /// Trusted verification keys. At least one is required.
    pub(crate) keys: Vec<KeySource>,

    /// Store backend.
    #[serde(default)]
    pub(crate) storage: StorageConfig,

    /// Ticket lifetime; tickets never expire when absent.
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub(crate) ticket_ttl: Option<Duration>,
}

#[bon::bon]
impl StatConfig {
    /// Creates a new configuration, validating all fields.
    ///
    /// # Optional Fields
    ///
    /// * `storage` - Store backend (default: in-memory).
    /// * `ticket_ttl` - Ticket lifetime (default: tickets never expire).
    ///
    /// # Errors
    ///
    /// Returns [`StatError::Config`] if [`validate`](Self::validate) fails.
    #[builder]
    pub fn new(
        keys: Vec<KeySource>,
        #[builder(default)] storage: StorageConfig,
        ticket_ttl: Option<Duration>,
    ) -> Result<Self> {
        let config = Self { keys, storage, ticket_ttl };
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`StatError::Config`] on malformed JSON, unknown fields or
    /// failed validation.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| StatError::config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`StatError::Config`] if the file cannot be read or is not a
    /// valid configuration.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            StatError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    /// Checks the configuration for values that cannot work.
    ///
    /// # Errors
    ///
    /// Returns [`StatError::Config`] if:
    /// - No keys are configured
    /// - `ticket_ttl` is zero
    /// - The sqlite path is empty
    pub fn validate(&self) -> Result<()> {
        if self.keys.is_empty() {
            return Err(StatError::config("at least one key is required"));
        }

        if self.ticket_ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(StatError::config("ticket_ttl must be greater than zero"));
        }

        if let StorageConfig::Sqlite { path } = &self.storage
            && path.as_os_str().is_empty()
        {
            return Err(StatError::config("sqlite path cannot be empty"));
        }

        Ok(())
    }

    /// Returns the configured key sources.
    #[must_use]
    pub fn keys(&self) -> &[KeySource] {
        &self.keys
    }

    /// Returns the store backend.
    #[must_use]
    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }

    /// Returns the ticket lifetime, if any.
    #[must_use]
    pub fn ticket_ttl(&self) -> Option<Duration> {
        self.ticket_ttl
    }
}
