// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::auth::jwks::DEFAULT_REFRESH_INTERVAL;
use crate::auth::{AdminToken, JwksRegistry, JwtValidator};
use crate::config::ServerConfig;
use crate::rate_limit::RateLimiter;
use crate::storage::{ConfigDatabase, InMemoryUserStore, SiteAuthConfigStore, StoreError, UserStore};

/// Failures while assembling [`AppState`] at startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to build JWKS HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("failed to open site auth config store: {0}")]
    Storage(#[from] StoreError),
}

#[derive(Clone)]
pub struct AppState {
    pub auth_configs: Arc<SiteAuthConfigStore>,
    pub validator: Arc<JwtValidator>,
    pub users: Arc<dyn UserStore>,
    pub rate_limiter: Arc<RateLimiter>,
    pub admin: AdminToken,
}

impl AppState {
    /// Build the state from server configuration, opening the config
    /// database at `config.db_path`.
    pub fn new(config: &ServerConfig) -> Result<Self, StartupError> {
        let client = reqwest::Client::builder()
            .timeout(config.jwks_fetch_timeout)
            .build()?;
        let database = ConfigDatabase::open(&config.db_path).map_err(StoreError::from)?;
        info!(path = %config.db_path.display(), "Opened site auth config database");

        Self::assemble(
            SiteAuthConfigStore::new(Arc::new(database))?,
            JwksRegistry::new(client, config.jwks_refresh_interval),
            config,
        )
    }

    /// State over an in-memory config database, with default settings.
    pub fn in_memory() -> Result<Self, StartupError> {
        let config = ServerConfig::default();
        Self::assemble(
            SiteAuthConfigStore::in_memory()?,
            JwksRegistry::new(reqwest::Client::new(), DEFAULT_REFRESH_INTERVAL),
            &config,
        )
    }

    fn assemble(
        auth_configs: SiteAuthConfigStore,
        jwks: JwksRegistry,
        config: &ServerConfig,
    ) -> Result<Self, StartupError> {
        // Stored JWKS sites get their keys fetched before the first token arrives.
        for url in auth_configs.jwks_endpoints()? {
            jwks.manager_for(&url);
        }

        Ok(Self {
            auth_configs: Arc::new(auth_configs),
            validator: Arc::new(JwtValidator::new(Arc::new(jwks))),
            users: Arc::new(InMemoryUserStore::new()),
            rate_limiter: Arc::new(RateLimiter::new(config.rate_limit)),
            admin: AdminToken::new(config.admin_api_token.as_deref()),
        })
    }

    pub fn jwks(&self) -> &Arc<JwksRegistry> {
        self.validator.jwks()
    }

    /// Drop JWKS endpoints that no stored configuration references any more.
    pub fn prune_jwks(&self) -> Result<usize, StoreError> {
        let live = self.auth_configs.jwks_endpoints()?;
        Ok(self.jwks().retain(|url| live.contains(url)))
    }

    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = Arc::new(rate_limiter);
        self
    }

    pub fn with_user_store(mut self, users: Arc<dyn UserStore>) -> Self {
        self.users = users;
        self
    }

    pub fn with_admin_token(mut self, token: &str) -> Self {
        self.admin = AdminToken::new(Some(token));
        self
    }
}
