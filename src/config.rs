// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `RATE_LIMIT_GET` | Read-class requests per minute per client | `100` |
//! | `RATE_LIMIT_POST` | Write-class requests per minute per client | `5` |
//! | `RATE_LIMIT_IDLE_SECS` | Idle time before a client's buckets are dropped | `600` |
//! | `RATE_LIMIT_SWEEP_SECS` | Interval between idle sweeps | `300` |
//! | `JWKS_REFRESH_SECS` | Interval between JWKS refreshes | `300` |
//! | `JWKS_FETCH_TIMEOUT_SECS` | Timeout for a single JWKS fetch | `10` |
//! | `DB_PATH` | redb file holding site auth configuration | `data/kotomi.redb` |
//! | `ADMIN_API_TOKEN` | Bearer token for the admin config API | unset (admin API disabled) |
//! | `CORS_ALLOWED_ORIGINS` | Comma-separated origins, or `*` | `*` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::rate_limit::{RateLimitConfig, DEFAULT_READ_PER_MINUTE, DEFAULT_WRITE_PER_MINUTE};

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const RATE_LIMIT_GET_ENV: &str = "RATE_LIMIT_GET";
pub const RATE_LIMIT_POST_ENV: &str = "RATE_LIMIT_POST";
pub const RATE_LIMIT_IDLE_SECS_ENV: &str = "RATE_LIMIT_IDLE_SECS";
pub const RATE_LIMIT_SWEEP_SECS_ENV: &str = "RATE_LIMIT_SWEEP_SECS";
pub const JWKS_REFRESH_SECS_ENV: &str = "JWKS_REFRESH_SECS";
pub const JWKS_FETCH_TIMEOUT_SECS_ENV: &str = "JWKS_FETCH_TIMEOUT_SECS";

/// Site auth configuration survives restarts in this file.
pub const DB_PATH_ENV: &str = "DB_PATH";

/// Shared secret for the admin configuration API.
///
/// When unset, every admin route answers 401.
pub const ADMIN_API_TOKEN_ENV: &str = "ADMIN_API_TOKEN";

pub const CORS_ALLOWED_ORIGINS_ENV: &str = "CORS_ALLOWED_ORIGINS";

/// `json` for structured logs, anything else for human-readable output.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_IDLE_SECS: u64 = 600;
const DEFAULT_SWEEP_SECS: u64 = 300;
const DEFAULT_JWKS_REFRESH_SECS: u64 = 300;
const DEFAULT_JWKS_FETCH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_DB_PATH: &str = "data/kotomi.redb";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Server settings resolved from the environment.
#[derive(Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub rate_limit: RateLimitConfig,
    pub jwks_refresh_interval: Duration,
    pub jwks_fetch_timeout: Duration,
    pub db_path: PathBuf,
    pub admin_api_token: Option<String>,
    /// `None` means any origin.
    pub cors_allowed_origins: Option<Vec<String>>,
    pub log_format: LogFormat,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("rate_limit", &self.rate_limit)
            .field("jwks_refresh_interval", &self.jwks_refresh_interval)
            .field("jwks_fetch_timeout", &self.jwks_fetch_timeout)
            .field("db_path", &self.db_path)
            .field("admin_api_enabled", &self.admin_api_token.is_some())
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ServerConfig {
    /// Load from process environment. Invalid values fall back to defaults
    /// with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read_per_minute = positive(&lookup, RATE_LIMIT_GET_ENV, DEFAULT_READ_PER_MINUTE);
        let write_per_minute = positive(&lookup, RATE_LIMIT_POST_ENV, DEFAULT_WRITE_PER_MINUTE);
        let idle_secs = positive(&lookup, RATE_LIMIT_IDLE_SECS_ENV, DEFAULT_IDLE_SECS);
        let sweep_secs = positive(&lookup, RATE_LIMIT_SWEEP_SECS_ENV, DEFAULT_SWEEP_SECS);

        Self {
            host: lookup(HOST_ENV)
                .filter(|h| !h.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parsed(&lookup, PORT_ENV, DEFAULT_PORT),
            rate_limit: RateLimitConfig {
                read_per_minute,
                write_per_minute,
                idle_timeout: Duration::from_secs(idle_secs),
                sweep_interval: Duration::from_secs(sweep_secs),
            },
            jwks_refresh_interval: Duration::from_secs(positive(
                &lookup,
                JWKS_REFRESH_SECS_ENV,
                DEFAULT_JWKS_REFRESH_SECS,
            )),
            jwks_fetch_timeout: Duration::from_secs(positive(
                &lookup,
                JWKS_FETCH_TIMEOUT_SECS_ENV,
                DEFAULT_JWKS_FETCH_TIMEOUT_SECS,
            )),
            db_path: lookup(DB_PATH_ENV)
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            admin_api_token: lookup(ADMIN_API_TOKEN_ENV).filter(|t| !t.is_empty()),
            cors_allowed_origins: cors_origins(lookup(CORS_ALLOWED_ORIGINS_ENV)),
            log_format: match lookup(LOG_FORMAT_ENV).as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parsed<T: FromStr + Copy>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T {
    match lookup(name) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(variable = name, value = %raw, "Invalid value, using default");
            default
        }),
    }
}

/// Like [`parsed`] but zero also falls back to the default.
fn positive<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T
where
    T: FromStr + Copy + PartialEq + Default,
{
    let value = parsed(lookup, name, default);
    if value == T::default() {
        warn!(variable = name, "Value must be positive, using default");
        return default;
    }
    value
}

fn cors_origins(raw: Option<String>) -> Option<Vec<String>> {
    let raw = raw?;
    if raw.trim() == "*" {
        return None;
    }
    let origins: Vec<String> = raw
        .split(',')
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect();
    (!origins.is_empty()).then_some(origins)
}
