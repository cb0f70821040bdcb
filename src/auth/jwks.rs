// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! ## Request Path
//!
//! Requests never fetch. [`JwksManager::decoding_key`] only reads the cache;
//! if the key set for an endpoint has not been loaded yet the token is
//! rejected as `KeyUnavailable`.
//!
//! ## Refresh
//!
//! [`JwksRegistry::run`] is spawned once at startup. Every tick it refreshes
//! each endpoint that is due:
//! - success: next refresh after the configured interval
//! - failure: the stale key set is kept and the endpoint is retried with
//!   exponential backoff (1s doubling, capped at the refresh interval)
//!
//! A newly registered endpoint is due immediately, so its first fetch
//! happens on the next tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default interval between successful refreshes (5 minutes).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// First retry delay after a failed fetch.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// How often the refresh loop checks for due endpoints.
const TICK: Duration = Duration::from_secs(1);

/// JWKS fetch failures. Only ever logged.
#[derive(Debug, Error)]
pub enum JwksError {
    #[error("failed to fetch JWKS: {0}")]
    Fetch(String),
    #[error("HTTP {0} from JWKS endpoint")]
    Status(u16),
}

/// Outcome of a key lookup against the cache.
pub enum KeyLookup {
    Found(DecodingKey, Algorithm),
    /// Key set loaded, but no key with this `kid`.
    UnknownKid,
    /// Key set never loaded successfully.
    NotLoaded,
}

/// Cached, already-converted keys.
struct KeyCache {
    keys: HashMap<String, (DecodingKey, Algorithm)>,
}

/// Refresh bookkeeping for one endpoint.
struct Schedule {
    next_at: Instant,
    backoff: Duration,
}

/// Key set for a single JWKS endpoint.
pub struct JwksManager {
    /// JWKS URL
    jwks_url: String,
    /// Cached keys indexed by `kid`
    cache: RwLock<Option<KeyCache>>,
    schedule: Mutex<Schedule>,
    /// HTTP client (carries the fetch timeout)
    client: reqwest::Client,
}

impl JwksManager {
    /// Create a new JWKS manager. Nothing is fetched until [`refresh`](Self::refresh).
    pub fn new(jwks_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            jwks_url: jwks_url.into(),
            cache: RwLock::new(None),
            schedule: Mutex::new(Schedule {
                next_at: Instant::now(),
                backoff: INITIAL_BACKOFF,
            }),
            client,
        }
    }

    /// Get the JWKS URL.
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Look up a decoding key by key ID. Never performs I/O.
    pub fn decoding_key(&self, kid: &str) -> KeyLookup {
        let cache = self.cache.read();
        match &*cache {
            None => KeyLookup::NotLoaded,
            Some(entry) => match entry.keys.get(kid) {
                Some((key, alg)) => KeyLookup::Found(key.clone(), *alg),
                None => KeyLookup::UnknownKid,
            },
        }
    }

    /// Whether a key set has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.cache.read().is_some()
    }

    /// Replace the cached key set. Returns the number of usable keys.
    ///
    /// Keys without a `kid` or with an unsupported key type are skipped.
    pub fn install(&self, jwks: &JwkSet) -> usize {
        let mut keys = HashMap::new();
        for jwk in &jwks.keys {
            let Some(kid) = jwk.common.key_id.clone() else {
                debug!(jwks_url = %self.jwks_url, "Skipping JWK without kid");
                continue;
            };
            match jwk_to_decoding_key(jwk) {
                Ok(converted) => {
                    keys.insert(kid, converted);
                }
                Err(reason) => {
                    warn!(jwks_url = %self.jwks_url, kid = %kid, reason = %reason, "Skipping unusable JWK");
                }
            }
        }

        let count = keys.len();
        *self.cache.write() = Some(KeyCache { keys });
        count
    }

    /// Fetch JWKS from the endpoint.
    async fn fetch_jwks(&self) -> Result<JwkSet, JwksError> {
        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| JwksError::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(JwksError::Status(response.status().as_u16()));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| JwksError::Fetch(e.to_string()))
    }

    /// Fetch and install the key set. On failure the stale cache is kept.
    pub async fn refresh(&self) -> Result<usize, JwksError> {
        let jwks = self.fetch_jwks().await?;
        Ok(self.install(&jwks))
    }

    fn is_due(&self, now: Instant) -> bool {
        self.schedule.lock().next_at <= now
    }

    fn record_success(&self, now: Instant, interval: Duration) {
        let mut schedule = self.schedule.lock();
        schedule.next_at = now + interval;
        schedule.backoff = INITIAL_BACKOFF;
    }

    /// Schedule a retry and return the delay chosen.
    fn record_failure(&self, now: Instant, interval: Duration) -> Duration {
        let mut schedule = self.schedule.lock();
        let delay = schedule.backoff.min(interval);
        schedule.next_at = now + delay;
        schedule.backoff = (schedule.backoff * 2).min(interval);
        delay
    }
}

/// All JWKS endpoints known to the process, one manager per URL.
pub struct JwksRegistry {
    managers: DashMap<String, Arc<JwksManager>>,
    client: reqwest::Client,
    refresh_interval: Duration,
}

impl JwksRegistry {
    /// `client` should carry a bounded timeout; it is shared by all managers.
    pub fn new(client: reqwest::Client, refresh_interval: Duration) -> Self {
        Self {
            managers: DashMap::new(),
            client,
            refresh_interval,
        }
    }

    /// Get (or register) the manager for an endpoint.
    pub fn manager_for(&self, jwks_url: &str) -> Arc<JwksManager> {
        self.managers
            .entry(jwks_url.to_string())
            .or_insert_with(|| {
                info!(jwks_url = %jwks_url, "Registered JWKS endpoint");
                Arc::new(JwksManager::new(jwks_url, self.client.clone()))
            })
            .clone()
    }

    /// Keep only endpoints for which `keep` holds. Returns how many were dropped.
    pub fn retain(&self, keep: impl Fn(&str) -> bool) -> usize {
        let mut dropped = 0;
        self.managers.retain(|url, _| {
            let kept = keep(url.as_str());
            if !kept {
                dropped += 1;
                info!(jwks_url = %url, "Unregistered JWKS endpoint");
            }
            kept
        });
        dropped
    }

    /// Number of registered endpoints.
    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    /// Refresh every endpoint that is due. Returns how many failed.
    pub async fn refresh_due(&self) -> usize {
        let now = Instant::now();
        let due: Vec<Arc<JwksManager>> = self
            .managers
            .iter()
            .filter(|entry| entry.value().is_due(now))
            .map(|entry| entry.value().clone())
            .collect();

        let mut failures = 0;
        for manager in due {
            match manager.refresh().await {
                Ok(count) => {
                    manager.record_success(Instant::now(), self.refresh_interval);
                    debug!(jwks_url = %manager.jwks_url(), keys = count, "JWKS refreshed");
                }
                Err(e) => {
                    failures += 1;
                    let retry_in = manager.record_failure(Instant::now(), self.refresh_interval);
                    warn!(
                        jwks_url = %manager.jwks_url(),
                        error = %e,
                        stale_cache = manager.is_loaded(),
                        retry_in_secs = retry_in.as_secs(),
                        "JWKS refresh failed"
                    );
                }
            }
        }
        failures
    }

    /// Run the refresh loop until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(registry.clone().run(shutdown.clone()));
    /// ```
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            interval_secs = self.refresh_interval.as_secs(),
            "JWKS refresher starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("JWKS refresher shutting down");
                return;
            }

            self.refresh_due().await;

            tokio::select! {
                _ = tokio::time::sleep(TICK) => {},
                _ = shutdown.cancelled() => {
                    info!("JWKS refresher shutting down");
                    return;
                }
            }
        }
    }
}

/// Convert a JWK to a DecodingKey.
fn jwk_to_decoding_key(jwk: &Jwk) -> Result<(DecodingKey, Algorithm), String> {
    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => {
            let key = DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
                .map_err(|e| format!("failed to create RSA key: {e}"))?;

            let alg = match jwk.common.key_algorithm {
                Some(KeyAlgorithm::RS384) => Algorithm::RS384,
                Some(KeyAlgorithm::RS512) => Algorithm::RS512,
                Some(KeyAlgorithm::PS256) => Algorithm::PS256,
                Some(KeyAlgorithm::PS384) => Algorithm::PS384,
                Some(KeyAlgorithm::PS512) => Algorithm::PS512,
                _ => Algorithm::RS256,
            };

            Ok((key, alg))
        }
        AlgorithmParameters::EllipticCurve(ec) => {
            let key = DecodingKey::from_ec_components(&ec.x, &ec.y)
                .map_err(|e| format!("failed to create EC key: {e}"))?;

            let alg = match jwk.common.key_algorithm {
                Some(KeyAlgorithm::ES384) => Algorithm::ES384,
                _ => Algorithm::ES256,
            };

            Ok((key, alg))
        }
        _ => Err("unsupported key type".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testutil::{rsa_jwks, serve_jwks};

    const URL: &str = "https://example.com/.well-known/jwks.json";

    #[test]
    fn manager_creation() {
        let manager = JwksManager::new(URL, reqwest::Client::new());
        assert_eq!(manager.jwks_url(), URL);
        assert!(!manager.is_loaded());
        assert!(matches!(manager.decoding_key("any"), KeyLookup::NotLoaded));
    }

    #[test]
    fn install_indexes_keys_by_kid() {
        let manager = JwksManager::new(URL, reqwest::Client::new());
        assert_eq!(manager.install(&rsa_jwks("key-1")), 1);

        assert!(manager.is_loaded());
        assert!(matches!(
            manager.decoding_key("key-1"),
            KeyLookup::Found(_, Algorithm::RS256)
        ));
        assert!(matches!(manager.decoding_key("key-2"), KeyLookup::UnknownKid));
    }

    #[test]
    fn install_skips_keys_without_kid() {
        let jwks: JwkSet = serde_json::from_value(serde_json::json!({
            "keys": [{ "kty": "oct", "k": "c2VjcmV0" }]
        }))
        .unwrap();
        let manager = JwksManager::new(URL, reqwest::Client::new());
        assert_eq!(manager.install(&jwks), 0);
        assert!(manager.is_loaded());
    }

    #[test]
    fn failure_backoff_doubles_and_caps() {
        let manager = JwksManager::new(URL, reqwest::Client::new());
        let interval = Duration::from_secs(5);
        let now = Instant::now();

        assert_eq!(manager.record_failure(now, interval), Duration::from_secs(1));
        assert_eq!(manager.record_failure(now, interval), Duration::from_secs(2));
        assert_eq!(manager.record_failure(now, interval), Duration::from_secs(4));
        assert_eq!(manager.record_failure(now, interval), Duration::from_secs(5));
        assert!(!manager.is_due(now));

        manager.record_success(now, interval);
        assert_eq!(manager.record_failure(now, interval), Duration::from_secs(1));
    }

    #[test]
    fn registry_reuses_managers() {
        let registry = JwksRegistry::new(reqwest::Client::new(), DEFAULT_REFRESH_INTERVAL);
        let a = registry.manager_for(URL);
        let b = registry.manager_for(URL);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_stale_keys() {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let registry = JwksRegistry::new(client, DEFAULT_REFRESH_INTERVAL);
        // Port 9 (discard) on localhost refuses connections.
        let manager = registry.manager_for("http://127.0.0.1:9/jwks.json");
        manager.install(&rsa_jwks("key-1"));

        assert_eq!(registry.refresh_due().await, 1);
        assert!(matches!(manager.decoding_key("key-1"), KeyLookup::Found(..)));
        assert!(!manager.is_due(Instant::now()));
    }

    #[tokio::test]
    async fn refresh_loads_served_key_set() {
        let url = serve_jwks(rsa_jwks("key-1")).await;
        let registry = JwksRegistry::new(reqwest::Client::new(), DEFAULT_REFRESH_INTERVAL);
        let manager = registry.manager_for(&url);

        assert_eq!(registry.refresh_due().await, 0);
        assert!(matches!(
            manager.decoding_key("key-1"),
            KeyLookup::Found(_, Algorithm::RS256)
        ));
        // Next refresh waits for the interval.
        assert!(!manager.is_due(Instant::now()));
    }

    #[tokio::test]
    async fn background_loop_fetches_new_endpoints() {
        let url = serve_jwks(rsa_jwks("key-1")).await;
        let registry = Arc::new(JwksRegistry::new(reqwest::Client::new(), DEFAULT_REFRESH_INTERVAL));
        let manager = registry.manager_for(&url);

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(registry.clone().run(shutdown.clone()));

        let mut loaded = false;
        for _ in 0..100 {
            if manager.is_loaded() {
                loaded = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        shutdown.cancel();
        task.await.unwrap();

        assert!(loaded, "key set fetched by the refresher");
        assert!(matches!(manager.decoding_key("key-1"), KeyLookup::Found(..)));
    }

    #[test]
    fn retain_drops_unlisted_endpoints() {
        let registry = JwksRegistry::new(reqwest::Client::new(), DEFAULT_REFRESH_INTERVAL);
        registry.manager_for(URL);
        registry.manager_for("https://other.example.com/jwks.json");

        assert_eq!(registry.retain(|url| url == URL), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.retain(|url| url == URL), 0);
    }
}
