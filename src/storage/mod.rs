// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Data-access leaves consumed by the auth layer:
//!
//! - `site_auth_config` - per-site JWT validation settings (admin CRUD)
//! - `config_db` - redb database persisting those settings across restarts
//! - `users` - commenter profiles upserted after successful authentication
//!
//! Site configuration goes through [`SiteAuthConfigBackend`]; user profiles
//! through [`UserStore`].

pub mod config_db;
pub mod site_auth_config;
pub mod users;

use thiserror::Error;

pub use config_db::{ConfigDatabase, ConfigDbError};
pub use site_auth_config::{SiteAuthConfigBackend, SiteAuthConfigStore};
pub use users::{InMemoryUserStore, UserProfile, UserStore, UserStoreError};

/// Errors raised by the configuration store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<ConfigDbError> for StoreError {
    fn from(e: ConfigDbError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
