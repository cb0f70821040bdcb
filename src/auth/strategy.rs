// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signature verification strategies, one per [`ValidationType`].
//!
//! A strategy turns a token header into the key and algorithm to verify
//! with. Key material is parsed once, when the strategy is built, so the
//! validator can cache strategies instead of PEM strings.

use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, Header};

use super::error::ValidationError;
use super::jwks::{JwksManager, JwksRegistry, KeyLookup};
use crate::models::{SiteAuthConfig, ValidationType};

const HMAC_ALGORITHMS: &[Algorithm] = &[Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

const RSA_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
];

const ECDSA_ALGORITHMS: &[Algorithm] = &[Algorithm::ES256, Algorithm::ES384];

/// Resolves the verification key for a token.
pub trait VerificationStrategy: Send + Sync {
    fn validation_type(&self) -> ValidationType;

    /// Key and algorithm for a token carrying `header`.
    ///
    /// Rejects algorithms outside the strategy's family, so an RSA site
    /// never accepts an HMAC-signed token.
    fn resolve_key(&self, header: &Header) -> Result<(DecodingKey, Algorithm), ValidationError>;
}

/// Shared-secret HMAC (HS256/384/512).
pub struct HmacStrategy {
    key: DecodingKey,
}

impl HmacStrategy {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

impl VerificationStrategy for HmacStrategy {
    fn validation_type(&self) -> ValidationType {
        ValidationType::Hmac
    }

    fn resolve_key(&self, header: &Header) -> Result<(DecodingKey, Algorithm), ValidationError> {
        ensure_family(header.alg, HMAC_ALGORITHMS)?;
        Ok((self.key.clone(), header.alg))
    }
}

/// PEM-encoded RSA public key (RS* and PS*).
pub struct RsaStrategy {
    key: DecodingKey,
}

impl RsaStrategy {
    pub fn from_pem(pem: &str) -> Result<Self, ValidationError> {
        let key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| ValidationError::KeyUnavailable(format!("invalid RSA public key: {e}")))?;
        Ok(Self { key })
    }
}

impl VerificationStrategy for RsaStrategy {
    fn validation_type(&self) -> ValidationType {
        ValidationType::Rsa
    }

    fn resolve_key(&self, header: &Header) -> Result<(DecodingKey, Algorithm), ValidationError> {
        ensure_family(header.alg, RSA_ALGORITHMS)?;
        Ok((self.key.clone(), header.alg))
    }
}

/// PEM-encoded EC public key (ES256/ES384).
pub struct EcdsaStrategy {
    key: DecodingKey,
}

impl EcdsaStrategy {
    pub fn from_pem(pem: &str) -> Result<Self, ValidationError> {
        let key = DecodingKey::from_ec_pem(pem.as_bytes())
            .map_err(|e| ValidationError::KeyUnavailable(format!("invalid EC public key: {e}")))?;
        Ok(Self { key })
    }
}

impl VerificationStrategy for EcdsaStrategy {
    fn validation_type(&self) -> ValidationType {
        ValidationType::Ecdsa
    }

    fn resolve_key(&self, header: &Header) -> Result<(DecodingKey, Algorithm), ValidationError> {
        ensure_family(header.alg, ECDSA_ALGORITHMS)?;
        Ok((self.key.clone(), header.alg))
    }
}

/// Key chosen by `kid` from a background-refreshed key set.
pub struct JwksStrategy {
    manager: Arc<JwksManager>,
}

impl JwksStrategy {
    pub fn new(manager: Arc<JwksManager>) -> Self {
        Self { manager }
    }
}

impl VerificationStrategy for JwksStrategy {
    fn validation_type(&self) -> ValidationType {
        ValidationType::Jwks
    }

    fn resolve_key(&self, header: &Header) -> Result<(DecodingKey, Algorithm), ValidationError> {
        let kid = header
            .kid
            .as_deref()
            .ok_or_else(|| ValidationError::InvalidSignature("token header has no kid".to_string()))?;

        match self.manager.decoding_key(kid) {
            KeyLookup::Found(key, key_alg) => {
                // The JWK may omit `alg`; accept any algorithm of the key's family.
                let family = if RSA_ALGORITHMS.contains(&key_alg) {
                    RSA_ALGORITHMS
                } else {
                    ECDSA_ALGORITHMS
                };
                ensure_family(header.alg, family)?;
                Ok((key, header.alg))
            }
            KeyLookup::UnknownKid => Err(ValidationError::InvalidSignature(format!(
                "no key with kid {kid}"
            ))),
            KeyLookup::NotLoaded => Err(ValidationError::KeyUnavailable(format!(
                "key set from {} not loaded yet",
                self.manager.jwks_url()
            ))),
        }
    }
}

/// Build the strategy for a site configuration.
///
/// JWKS sites register their endpoint with `jwks`; the first fetch happens
/// in the background refresher.
pub fn build_strategy(
    config: &SiteAuthConfig,
    jwks: &JwksRegistry,
) -> Result<Arc<dyn VerificationStrategy>, ValidationError> {
    let strategy: Arc<dyn VerificationStrategy> = match config.validation_type {
        ValidationType::Hmac => Arc::new(HmacStrategy::new(key_field(&config.secret, "secret")?)),
        ValidationType::Rsa => Arc::new(RsaStrategy::from_pem(key_field(
            &config.public_key,
            "public_key",
        )?)?),
        ValidationType::Ecdsa => Arc::new(EcdsaStrategy::from_pem(key_field(
            &config.public_key,
            "public_key",
        )?)?),
        ValidationType::Jwks => {
            let url = key_field(&config.jwks_endpoint, "jwks_endpoint")?;
            Arc::new(JwksStrategy::new(jwks.manager_for(url)))
        }
    };
    Ok(strategy)
}

fn key_field<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, ValidationError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ValidationError::KeyUnavailable(format!("{name} not configured")))
}

fn ensure_family(alg: Algorithm, allowed: &[Algorithm]) -> Result<(), ValidationError> {
    if allowed.contains(&alg) {
        Ok(())
    } else {
        Err(ValidationError::InvalidSignature(format!(
            "algorithm {alg:?} not accepted"
        )))
    }
}
