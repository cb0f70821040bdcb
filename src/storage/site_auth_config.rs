// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Site auth configuration store.
//!
//! One configuration per site, validated on every write and persisted
//! through a [`SiteAuthConfigBackend`] (redb in production). The middleware
//! reads through [`SiteAuthConfigStore::get_by_site_id`] on each
//! authenticated request; admin handlers only ever see the redacted
//! [`SiteAuthConfigView`](crate::models::SiteAuthConfigView).

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use super::config_db::ConfigDatabase;
use super::{StoreError, StoreResult};
use crate::models::{
    SiteAuthConfig, SiteAuthConfigRequest, ValidationType, DEFAULT_EXPIRATION_BUFFER_SECS,
};

/// Persistence behind [`SiteAuthConfigStore`].
///
/// Implementations only store and load; validation, revisions and the
/// one-config-per-site rule live in the store.
pub trait SiteAuthConfigBackend: Send + Sync {
    fn load(&self, site_id: &str) -> StoreResult<Option<SiteAuthConfig>>;

    /// Insert or replace the configuration for `config.site_id`.
    fn save(&self, config: &SiteAuthConfig) -> StoreResult<()>;

    /// Returns whether a configuration was removed.
    fn remove(&self, site_id: &str) -> StoreResult<bool>;

    fn list(&self) -> StoreResult<Vec<SiteAuthConfig>>;
}

/// Per-site authentication configuration.
pub struct SiteAuthConfigStore {
    backend: Arc<dyn SiteAuthConfigBackend>,
    /// Serializes writes so check-then-save is atomic.
    writes: Mutex<()>,
    revisions: AtomicU64,
}

impl SiteAuthConfigStore {
    /// Wrap a backend. Revisions continue above the highest one already
    /// stored, so cached keys from before a restart can never match.
    pub fn new(backend: Arc<dyn SiteAuthConfigBackend>) -> StoreResult<Self> {
        let highest = backend
            .list()?
            .iter()
            .map(|config| config.revision)
            .max()
            .unwrap_or(0);

        Ok(Self {
            backend,
            writes: Mutex::new(()),
            revisions: AtomicU64::new(highest),
        })
    }

    /// A store backed by an in-memory redb database.
    pub fn in_memory() -> StoreResult<Self> {
        Self::new(Arc::new(ConfigDatabase::in_memory()?))
    }

    /// Get the configuration for a site.
    pub fn get_by_site_id(&self, site_id: &str) -> StoreResult<SiteAuthConfig> {
        self.backend.load(site_id)?.ok_or_else(|| not_found(site_id))
    }

    /// Create the configuration for a site.
    pub fn create(&self, site_id: &str, request: SiteAuthConfigRequest) -> StoreResult<SiteAuthConfig> {
        let validation_type = request
            .validation_type
            .ok_or_else(|| StoreError::Invalid("validation_type is required".to_string()))?;

        let now = Utc::now();
        let mut config = SiteAuthConfig {
            id: Uuid::new_v4().to_string(),
            site_id: site_id.to_string(),
            auth_mode: request.auth_mode,
            validation_type,
            secret: non_empty(request.secret),
            public_key: non_empty(request.public_key),
            jwks_endpoint: non_empty(request.jwks_endpoint),
            issuer: non_empty(request.issuer),
            audience: non_empty(request.audience),
            expiration_buffer_seconds: expiration_buffer(request.expiration_buffer_seconds)?
                .unwrap_or(DEFAULT_EXPIRATION_BUFFER_SECS),
            revision: 0,
            created_at: now,
            updated_at: now,
        };
        validate(&config)?;

        let _guard = self.writes.lock();
        if self.backend.load(site_id)?.is_some() {
            return Err(StoreError::AlreadyExists(format!(
                "Auth config for site {site_id}"
            )));
        }
        config.revision = self.next_revision();
        self.backend.save(&config)?;
        Ok(config)
    }

    /// Replace the configuration for a site.
    ///
    /// The stored secret survives an update that omits it while the site
    /// keeps HMAC validation.
    pub fn update(&self, site_id: &str, request: SiteAuthConfigRequest) -> StoreResult<SiteAuthConfig> {
        let _guard = self.writes.lock();
        let existing = self.backend.load(site_id)?.ok_or_else(|| not_found(site_id))?;

        let validation_type = request.validation_type.unwrap_or(existing.validation_type);
        let secret = match non_empty(request.secret) {
            Some(secret) => Some(secret),
            None if validation_type == ValidationType::Hmac => existing.secret.clone(),
            None => None,
        };

        let updated = SiteAuthConfig {
            id: existing.id.clone(),
            site_id: existing.site_id.clone(),
            auth_mode: request.auth_mode,
            validation_type,
            secret,
            public_key: non_empty(request.public_key),
            jwks_endpoint: non_empty(request.jwks_endpoint),
            issuer: non_empty(request.issuer),
            audience: non_empty(request.audience),
            expiration_buffer_seconds: expiration_buffer(request.expiration_buffer_seconds)?
                .unwrap_or(existing.expiration_buffer_seconds),
            revision: self.next_revision(),
            created_at: existing.created_at,
            updated_at: Utc::now(),
        };
        validate(&updated)?;

        self.backend.save(&updated)?;
        Ok(updated)
    }

    /// Delete the configuration for a site.
    pub fn delete(&self, site_id: &str) -> StoreResult<()> {
        let _guard = self.writes.lock();
        if self.backend.remove(site_id)? {
            Ok(())
        } else {
            Err(not_found(site_id))
        }
    }

    /// Distinct JWKS endpoints referenced by any stored configuration.
    pub fn jwks_endpoints(&self) -> StoreResult<BTreeSet<String>> {
        Ok(self
            .backend
            .list()?
            .into_iter()
            .filter_map(|c| c.jwks_endpoint)
            .collect())
    }

    fn next_revision(&self) -> u64 {
        self.revisions.fetch_add(1, Ordering::Relaxed) + 1
    }
}

fn not_found(site_id: &str) -> StoreError {
    StoreError::NotFound(format!("Auth config for site {site_id}"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn expiration_buffer(value: Option<i64>) -> StoreResult<Option<u64>> {
    match value {
        None => Ok(None),
        Some(v) => u64::try_from(v).map(Some).map_err(|_| {
            StoreError::Invalid("expiration_buffer_seconds must not be negative".to_string())
        }),
    }
}

/// Check that exactly one key-material field is set and that it matches
/// the validation type.
fn validate(config: &SiteAuthConfig) -> StoreResult<()> {
    let populated = [
        config.secret.is_some(),
        config.public_key.is_some(),
        config.jwks_endpoint.is_some(),
    ]
    .iter()
    .filter(|set| **set)
    .count();

    if populated != 1 {
        return Err(StoreError::Invalid(
            "exactly one of secret, public_key or jwks_endpoint must be set".to_string(),
        ));
    }

    match config.validation_type {
        ValidationType::Hmac => {
            if config.secret.is_none() {
                return Err(StoreError::Invalid("hmac validation requires secret".to_string()));
            }
        }
        ValidationType::Rsa | ValidationType::Ecdsa => {
            let pem_text = config.public_key.as_deref().ok_or_else(|| {
                StoreError::Invalid(format!(
                    "{} validation requires public_key",
                    config.validation_type
                ))
            })?;
            let block = pem::parse(pem_text)
                .map_err(|e| StoreError::Invalid(format!("public_key is not valid PEM: {e}")))?;
            if !block.tag().ends_with("PUBLIC KEY") {
                return Err(StoreError::Invalid(format!(
                    "public_key must be a PEM public key, got {}",
                    block.tag()
                )));
            }
        }
        ValidationType::Jwks => {
            let endpoint = config.jwks_endpoint.as_deref().ok_or_else(|| {
                StoreError::Invalid("jwks validation requires jwks_endpoint".to_string())
            })?;
            let url = url::Url::parse(endpoint)
                .map_err(|e| StoreError::Invalid(format!("jwks_endpoint is not a valid URL: {e}")))?;
            if !matches!(url.scheme(), "https" | "http") {
                return Err(StoreError::Invalid(
                    "jwks_endpoint must use http or https".to_string(),
                ));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AuthMode;

    const RSA_PUBLIC_PEM: &str = crate::auth::testutil::RSA_PUBLIC_PEM;

    fn store() -> SiteAuthConfigStore {
        SiteAuthConfigStore::in_memory().unwrap()
    }

    fn hmac_request(secret: &str) -> SiteAuthConfigRequest {
        SiteAuthConfigRequest {
            validation_type: Some(ValidationType::Hmac),
            secret: Some(secret.to_string()),
            issuer: Some("https://example.com".to_string()),
            audience: Some("kotomi".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn create_then_get() {
        let store = store();
        let created = store.create("site-1", hmac_request("s3cret")).unwrap();
        assert_eq!(created.site_id, "site-1");
        assert_eq!(created.expiration_buffer_seconds, DEFAULT_EXPIRATION_BUFFER_SECS);

        let fetched = store.get_by_site_id("site-1").unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn missing_site_is_not_found() {
        let store = store();
        assert!(matches!(
            store.get_by_site_id("nope"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn one_config_per_site() {
        let store = store();
        store.create("site-1", hmac_request("a")).unwrap();
        assert!(matches!(
            store.create("site-1", hmac_request("b")),
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn rejects_multiple_key_fields() {
        let store = store();
        let mut request = hmac_request("a");
        request.jwks_endpoint = Some("https://example.com/jwks.json".to_string());
        assert!(matches!(
            store.create("site-1", request),
            Err(StoreError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_key_material_for_wrong_type() {
        let store = store();
        let request = SiteAuthConfigRequest {
            validation_type: Some(ValidationType::Rsa),
            secret: Some("a".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            store.create("site-1", request),
            Err(StoreError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_garbage_public_key() {
        let store = store();
        let request = SiteAuthConfigRequest {
            validation_type: Some(ValidationType::Ecdsa),
            public_key: Some("not a pem".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            store.create("site-1", request),
            Err(StoreError::Invalid(_))
        ));
    }

    #[test]
    fn accepts_rsa_public_key() {
        let store = store();
        let request = SiteAuthConfigRequest {
            auth_mode: AuthMode::Hosted,
            validation_type: Some(ValidationType::Rsa),
            public_key: Some(RSA_PUBLIC_PEM.to_string()),
            ..Default::default()
        };
        let created = store.create("site-1", request).unwrap();
        assert_eq!(created.auth_mode, AuthMode::Hosted);
    }

    #[test]
    fn rejects_non_http_jwks_endpoint() {
        let store = store();
        let request = SiteAuthConfigRequest {
            validation_type: Some(ValidationType::Jwks),
            jwks_endpoint: Some("ftp://example.com/jwks".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            store.create("site-1", request),
            Err(StoreError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_negative_buffer() {
        let store = store();
        let mut request = hmac_request("a");
        request.expiration_buffer_seconds = Some(-1);
        assert!(matches!(
            store.create("site-1", request),
            Err(StoreError::Invalid(_))
        ));
    }

    #[test]
    fn update_keeps_secret_when_omitted() {
        let store = store();
        let created = store.create("site-1", hmac_request("keep-me")).unwrap();

        let mut request = hmac_request("ignored");
        request.secret = None;
        request.issuer = Some("https://other.example.com".to_string());
        let updated = store.update("site-1", request).unwrap();

        assert_eq!(updated.secret.as_deref(), Some("keep-me"));
        assert_eq!(updated.issuer.as_deref(), Some("https://other.example.com"));
        assert!(updated.revision > created.revision);
        assert_eq!(updated.created_at, created.created_at);
    }

    #[test]
    fn update_to_jwks_drops_secret() {
        let store = store();
        store.create("site-1", hmac_request("old")).unwrap();

        let request = SiteAuthConfigRequest {
            validation_type: Some(ValidationType::Jwks),
            jwks_endpoint: Some("https://example.com/.well-known/jwks.json".to_string()),
            ..Default::default()
        };
        let updated = store.update("site-1", request).unwrap();
        assert!(updated.secret.is_none());
        assert_eq!(store.jwks_endpoints().unwrap().len(), 1);
    }

    #[test]
    fn update_missing_site_is_not_found() {
        let store = store();
        assert!(matches!(
            store.update("site-1", hmac_request("a")),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn delete_removes_config() {
        let store = store();
        store.create("site-1", hmac_request("a")).unwrap();
        store.delete("site-1").unwrap();
        assert!(store.get_by_site_id("site-1").is_err());
        assert!(matches!(store.delete("site-1"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn configs_survive_reopening_the_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("configs.redb");

        let first_revision = {
            let store = SiteAuthConfigStore::new(Arc::new(ConfigDatabase::open(&path).unwrap())).unwrap();
            store.create("site-1", hmac_request("s3cret")).unwrap().revision
        };

        let store = SiteAuthConfigStore::new(Arc::new(ConfigDatabase::open(&path).unwrap())).unwrap();
        let loaded = store.get_by_site_id("site-1").unwrap();
        assert_eq!(loaded.secret.as_deref(), Some("s3cret"));
        assert_eq!(loaded.revision, first_revision);

        let updated = store.update("site-1", hmac_request("rotated")).unwrap();
        assert!(updated.revision > first_revision);
    }

    #[test]
    fn jwks_endpoints_are_distinct() {
        let store = store();
        for site in ["site-1", "site-2"] {
            let request = SiteAuthConfigRequest {
                validation_type: Some(ValidationType::Jwks),
                jwks_endpoint: Some("https://example.com/jwks.json".to_string()),
                ..Default::default()
            };
            store.create(site, request).unwrap();
        }
        store.create("site-3", hmac_request("a")).unwrap();

        let endpoints = store.jwks_endpoints().unwrap();
        assert_eq!(endpoints.len(), 1);
        assert!(endpoints.contains("https://example.com/jwks.json"));
    }

    struct OfflineBackend;

    impl SiteAuthConfigBackend for OfflineBackend {
        fn load(&self, _site_id: &str) -> StoreResult<Option<SiteAuthConfig>> {
            Err(StoreError::Backend("offline".to_string()))
        }

        fn save(&self, _config: &SiteAuthConfig) -> StoreResult<()> {
            Err(StoreError::Backend("offline".to_string()))
        }

        fn remove(&self, _site_id: &str) -> StoreResult<bool> {
            Err(StoreError::Backend("offline".to_string()))
        }

        fn list(&self) -> StoreResult<Vec<SiteAuthConfig>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn backend_failures_are_not_reported_as_missing() {
        let store = SiteAuthConfigStore::new(Arc::new(OfflineBackend)).unwrap();
        assert!(matches!(store.get_by_site_id("site-1"), Err(StoreError::Backend(_))));
        assert!(matches!(
            store.create("site-1", hmac_request("a")),
            Err(StoreError::Backend(_))
        ));
    }
}
