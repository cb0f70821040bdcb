// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded site auth configuration database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `site_auth_configs`: site_id → serialized [`StoredConfig`] (JSON bytes)
//!
//! The stored record carries the HMAC secret and the revision, neither of
//! which [`SiteAuthConfig`] ever serializes on its own.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::backends::InMemoryBackend;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use super::site_auth_config::SiteAuthConfigBackend;
use super::StoreResult;
use crate::models::{AuthMode, SiteAuthConfig, ValidationType};

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary table: site_id → serialized StoredConfig (JSON bytes).
const SITE_AUTH_CONFIGS: TableDefinition<&str, &[u8]> = TableDefinition::new("site_auth_configs");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigDbError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ConfigDbResult<T> = Result<T, ConfigDbError>;

// =============================================================================
// Stored Record
// =============================================================================

#[derive(Serialize, Deserialize)]
struct StoredConfig {
    id: String,
    site_id: String,
    auth_mode: AuthMode,
    validation_type: ValidationType,
    #[serde(default)]
    secret: Option<String>,
    #[serde(default)]
    public_key: Option<String>,
    #[serde(default)]
    jwks_endpoint: Option<String>,
    #[serde(default)]
    issuer: Option<String>,
    #[serde(default)]
    audience: Option<String>,
    expiration_buffer_seconds: u64,
    revision: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<&SiteAuthConfig> for StoredConfig {
    fn from(config: &SiteAuthConfig) -> Self {
        Self {
            id: config.id.clone(),
            site_id: config.site_id.clone(),
            auth_mode: config.auth_mode,
            validation_type: config.validation_type,
            secret: config.secret.clone(),
            public_key: config.public_key.clone(),
            jwks_endpoint: config.jwks_endpoint.clone(),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            expiration_buffer_seconds: config.expiration_buffer_seconds,
            revision: config.revision,
            created_at: config.created_at,
            updated_at: config.updated_at,
        }
    }
}

impl From<StoredConfig> for SiteAuthConfig {
    fn from(stored: StoredConfig) -> Self {
        Self {
            id: stored.id,
            site_id: stored.site_id,
            auth_mode: stored.auth_mode,
            validation_type: stored.validation_type,
            secret: stored.secret,
            public_key: stored.public_key,
            jwks_endpoint: stored.jwks_endpoint,
            issuer: stored.issuer,
            audience: stored.audience,
            expiration_buffer_seconds: stored.expiration_buffer_seconds,
            revision: stored.revision,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        }
    }
}

fn decode(bytes: &[u8]) -> ConfigDbResult<SiteAuthConfig> {
    let stored: StoredConfig = serde_json::from_slice(bytes)?;
    Ok(stored.into())
}

// =============================================================================
// ConfigDatabase
// =============================================================================

/// Durable store of per-site auth configuration.
pub struct ConfigDatabase {
    db: Database,
}

impl ConfigDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> ConfigDbResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::init(Database::create(path)?)
    }

    /// A database that lives only as long as the process.
    pub fn in_memory() -> ConfigDbResult<Self> {
        Self::init(Database::builder().create_with_backend(InMemoryBackend::new())?)
    }

    fn init(db: Database) -> ConfigDbResult<Self> {
        // Pre-create the table so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SITE_AUTH_CONFIGS)?;
        }
        write_txn.commit()?;
        Ok(Self { db })
    }

    pub fn get(&self, site_id: &str) -> ConfigDbResult<Option<SiteAuthConfig>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SITE_AUTH_CONFIGS)?;
        match table.get(site_id)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    /// Insert or replace the configuration for `config.site_id`.
    pub fn put(&self, config: &SiteAuthConfig) -> ConfigDbResult<()> {
        let json = serde_json::to_vec(&StoredConfig::from(config))?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SITE_AUTH_CONFIGS)?;
            table.insert(config.site_id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Returns whether a configuration was removed.
    pub fn remove(&self, site_id: &str) -> ConfigDbResult<bool> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(SITE_AUTH_CONFIGS)?;
            let existed = table.remove(site_id)?.is_some();
            existed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    pub fn list(&self) -> ConfigDbResult<Vec<SiteAuthConfig>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SITE_AUTH_CONFIGS)?;
        let mut configs = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            configs.push(decode(value.value())?);
        }
        Ok(configs)
    }
}

impl SiteAuthConfigBackend for ConfigDatabase {
    fn load(&self, site_id: &str) -> StoreResult<Option<SiteAuthConfig>> {
        Ok(self.get(site_id)?)
    }

    fn save(&self, config: &SiteAuthConfig) -> StoreResult<()> {
        Ok(self.put(config)?)
    }

    fn remove(&self, site_id: &str) -> StoreResult<bool> {
        Ok(ConfigDatabase::remove(self, site_id)?)
    }

    fn list(&self) -> StoreResult<Vec<SiteAuthConfig>> {
        Ok(ConfigDatabase::list(self)?)
    }
}
