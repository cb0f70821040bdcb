// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT validation against a site's auth configuration.
//!
//! ## Order of Checks
//!
//! 1. Header decodes (otherwise `InvalidSignature`)
//! 2. `exp + expiration_buffer_seconds >= now`, read before the signature,
//!    so an expired token is always `Expired`
//! 3. Key resolved through the site's strategy
//! 4. Signature, `exp`, `iss`, `aud` verified by `jsonwebtoken`
//! 5. `kotomi_user` claim turned into an [`Identity`]

use std::num::NonZeroUsize;
use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use super::error::ValidationError;
use super::identity::{ExpiryClaim, Identity, TokenClaims};
use super::jwks::JwksRegistry;
use super::strategy::{build_strategy, VerificationStrategy};
use crate::models::SiteAuthConfig;

/// Sites whose parsed keys are kept in memory.
const STRATEGY_CACHE_SIZE: usize = 1024;

struct CachedStrategy {
    revision: u64,
    strategy: Arc<dyn VerificationStrategy>,
}

/// Validates tokens for any site. Safe to share across requests.
pub struct JwtValidator {
    jwks: Arc<JwksRegistry>,
    /// Parsed strategies keyed by site; stale once the config revision moves.
    strategies: Mutex<LruCache<String, CachedStrategy>>,
}

impl JwtValidator {
    pub fn new(jwks: Arc<JwksRegistry>) -> Self {
        let capacity = NonZeroUsize::new(STRATEGY_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self {
            jwks,
            strategies: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn jwks(&self) -> &Arc<JwksRegistry> {
        &self.jwks
    }

    /// Validate `token` for the site described by `config`.
    pub fn validate_token(&self, token: &str, config: &SiteAuthConfig) -> Result<Identity, ValidationError> {
        let header = decode_header(token)
            .map_err(|e| ValidationError::InvalidSignature(format!("invalid token header: {e}")))?;

        check_expiry(token, config.expiration_buffer_seconds)?;

        let strategy = self.strategy_for(config)?;
        let (key, alg) = strategy.resolve_key(&header)?;

        let validation = build_validation(alg, config);
        let data = decode::<TokenClaims>(token, &key, &validation).map_err(map_jwt_error)?;

        Identity::try_from(data.claims)
    }

    /// Cached strategy for the config, rebuilt when the revision changes.
    fn strategy_for(&self, config: &SiteAuthConfig) -> Result<Arc<dyn VerificationStrategy>, ValidationError> {
        {
            let mut cache = self.strategies.lock();
            if let Some(cached) = cache.get(&config.site_id) {
                if cached.revision == config.revision {
                    return Ok(cached.strategy.clone());
                }
            }
        }

        // Parse outside the lock.
        let strategy = build_strategy(config, &self.jwks)?;
        debug!(
            site_id = %config.site_id,
            validation_type = %config.validation_type,
            revision = config.revision,
            "Built verification strategy"
        );

        self.strategies.lock().put(
            config.site_id.clone(),
            CachedStrategy {
                revision: config.revision,
                strategy: strategy.clone(),
            },
        );
        Ok(strategy)
    }

    /// Drop the cached strategy for a site.
    pub fn invalidate(&self, site_id: &str) {
        self.strategies.lock().pop(site_id);
    }
}

/// Reject tokens whose `exp` plus the grace period is in the past.
fn check_expiry(token: &str, buffer_secs: u64) -> Result<(), ValidationError> {
    let unverified = jsonwebtoken::dangerous::insecure_decode::<ExpiryClaim>(token)
        .map_err(|e| ValidationError::MalformedClaims(format!("unreadable claims: {e}")))?;

    let exp = unverified
        .claims
        .exp
        .ok_or_else(|| ValidationError::MalformedClaims("missing exp claim".to_string()))?;

    let now = chrono::Utc::now().timestamp();
    let buffer = i64::try_from(buffer_secs).unwrap_or(i64::MAX);
    if exp.saturating_add(buffer) < now {
        return Err(ValidationError::Expired);
    }
    Ok(())
}

fn build_validation(alg: Algorithm, config: &SiteAuthConfig) -> Validation {
    let mut validation = Validation::new(alg);
    validation.leeway = config.expiration_buffer_seconds;

    let mut required = vec!["exp"];
    if let Some(issuer) = &config.issuer {
        validation.set_issuer(&[issuer]);
        required.push("iss");
    }
    match &config.audience {
        Some(audience) => {
            validation.set_audience(&[audience]);
            required.push("aud");
        }
        None => validation.validate_aud = false,
    }
    validation.set_required_spec_claims(&required);
    validation
}

fn map_jwt_error(error: jsonwebtoken::errors::Error) -> ValidationError {
    match error.kind() {
        ErrorKind::ExpiredSignature => ValidationError::Expired,
        ErrorKind::InvalidIssuer => ValidationError::ClaimMismatch("issuer mismatch".to_string()),
        ErrorKind::InvalidAudience => ValidationError::ClaimMismatch("audience mismatch".to_string()),
        ErrorKind::ImmatureSignature => ValidationError::ClaimMismatch("token not yet valid".to_string()),
        ErrorKind::MissingRequiredClaim(claim) if claim == "iss" || claim == "aud" => {
            ValidationError::ClaimMismatch(format!("missing {claim} claim"))
        }
        ErrorKind::MissingRequiredClaim(claim) => {
            ValidationError::MalformedClaims(format!("missing {claim} claim"))
        }
        ErrorKind::Json(e) => ValidationError::MalformedClaims(format!("invalid claims: {e}")),
        _ => ValidationError::InvalidSignature(error.to_string()),
    }
}
