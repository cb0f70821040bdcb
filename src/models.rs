// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Site Authentication Models
//!
//! Per-site ("tenant") authentication configuration and the request/response
//! shapes used by the admin configuration API.
//!
//! ## Key Material
//!
//! Exactly one of `secret`, `public_key` or `jwks_endpoint` is populated and
//! it must agree with `validation_type`:
//!
//! | `validation_type` | Key field       |
//! |-------------------|-----------------|
//! | `hmac`            | `secret`        |
//! | `rsa` / `ecdsa`   | `public_key`    |
//! | `jwks`            | `jwks_endpoint` |
//!
//! The HMAC secret is write-only. It is never serialized and never shown by
//! `Debug`, so it cannot leak through JSON responses or log lines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Default grace period applied to `exp` when none is configured.
pub const DEFAULT_EXPIRATION_BUFFER_SECS: u64 = 60;

// =============================================================================
// Enumerations
// =============================================================================

/// How end users of a site obtain their tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Tokens are issued by the site's own identity provider.
    #[default]
    External,
    /// Tokens are issued by the hosted login flow and may arrive as a cookie.
    #[serde(alias = "kotomi")]
    Hosted,
}

/// Signature verification scheme for a site's tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ValidationType {
    Hmac,
    Rsa,
    Ecdsa,
    Jwks,
}

impl std::fmt::Display for ValidationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationType::Hmac => write!(f, "hmac"),
            ValidationType::Rsa => write!(f, "rsa"),
            ValidationType::Ecdsa => write!(f, "ecdsa"),
            ValidationType::Jwks => write!(f, "jwks"),
        }
    }
}

// =============================================================================
// Stored Configuration
// =============================================================================

/// Authentication configuration for a single site.
#[derive(Clone, Serialize)]
pub struct SiteAuthConfig {
    /// Unique configuration identifier (UUID).
    pub id: String,
    /// Site this configuration belongs to (one configuration per site).
    pub site_id: String,
    pub auth_mode: AuthMode,
    pub validation_type: ValidationType,
    /// Shared HMAC secret. Never serialized.
    #[serde(skip)]
    pub secret: Option<String>,
    /// PEM-encoded public key for RSA / ECDSA.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    /// JWKS document URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks_endpoint: Option<String>,
    /// Expected `iss` claim (not checked when absent).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    /// Expected `aud` entry (not checked when absent).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    /// Grace period in seconds added to `exp`.
    pub expiration_buffer_seconds: u64,
    /// Bumped on every write; used to invalidate parsed-key caches.
    #[serde(skip)]
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for SiteAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteAuthConfig")
            .field("id", &self.id)
            .field("site_id", &self.site_id)
            .field("auth_mode", &self.auth_mode)
            .field("validation_type", &self.validation_type)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("public_key", &self.public_key.is_some())
            .field("jwks_endpoint", &self.jwks_endpoint)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("expiration_buffer_seconds", &self.expiration_buffer_seconds)
            .field("revision", &self.revision)
            .finish()
    }
}

impl SiteAuthConfig {
    /// Redacted view returned by every read path of the admin API.
    pub fn view(&self) -> SiteAuthConfigView {
        SiteAuthConfigView {
            id: self.id.clone(),
            site_id: self.site_id.clone(),
            auth_mode: self.auth_mode,
            validation_type: self.validation_type,
            has_secret: self.secret.is_some(),
            public_key: self.public_key.clone(),
            jwks_endpoint: self.jwks_endpoint.clone(),
            issuer: self.issuer.clone(),
            audience: self.audience.clone(),
            expiration_buffer_seconds: self.expiration_buffer_seconds,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

// =============================================================================
// API Shapes
// =============================================================================

/// Request body for creating or updating a site's auth configuration.
///
/// On update, an omitted `secret` keeps the stored one as long as the
/// validation type stays `hmac`. An omitted `expiration_buffer_seconds`
/// keeps the stored value (or the default on create).
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct SiteAuthConfigRequest {
    #[serde(default)]
    pub auth_mode: AuthMode,
    #[serde(alias = "jwt_validation_type")]
    pub validation_type: Option<ValidationType>,
    #[serde(default, alias = "jwt_secret")]
    pub secret: Option<String>,
    #[serde(default, alias = "jwt_public_key")]
    pub public_key: Option<String>,
    #[serde(default)]
    pub jwks_endpoint: Option<String>,
    #[serde(default, alias = "jwt_issuer")]
    pub issuer: Option<String>,
    #[serde(default, alias = "jwt_audience")]
    pub audience: Option<String>,
    #[serde(default, alias = "token_expiration_buffer")]
    pub expiration_buffer_seconds: Option<i64>,
}

/// Auth configuration as shown to administrators (secret redacted).
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq)]
pub struct SiteAuthConfigView {
    pub id: String,
    pub site_id: String,
    pub auth_mode: AuthMode,
    pub validation_type: ValidationType,
    /// Whether an HMAC secret is stored. The secret itself is never returned.
    pub has_secret: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    pub expiration_buffer_seconds: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public auth discovery payload (lets embeds choose a login flow).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct PublicAuthInfo {
    pub site_id: String,
    pub auth_mode: AuthMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> SiteAuthConfig {
        let now = Utc::now();
        SiteAuthConfig {
            id: "cfg-1".to_string(),
            site_id: "site-1".to_string(),
            auth_mode: AuthMode::External,
            validation_type: ValidationType::Hmac,
            secret: Some("super-secret-value".to_string()),
            public_key: None,
            jwks_endpoint: None,
            issuer: Some("https://example.com".to_string()),
            audience: Some("kotomi".to_string()),
            expiration_buffer_seconds: 60,
            revision: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn serialized_config_omits_secret() {
        let json = serde_json::to_string(&sample_config()).unwrap();
        assert!(!json.contains("super-secret-value"));
        assert!(!json.contains("\"secret\""));
    }

    #[test]
    fn debug_output_redacts_secret() {
        let debug = format!("{:?}", sample_config());
        assert!(!debug.contains("super-secret-value"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn view_reports_secret_presence_only() {
        let view = sample_config().view();
        assert!(view.has_secret);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["validation_type"], "hmac");
        assert!(json.get("secret").is_none());
    }

    #[test]
    fn request_accepts_legacy_field_names() {
        let request: SiteAuthConfigRequest = serde_json::from_str(
            r#"{"auth_mode":"kotomi","jwt_validation_type":"rsa","jwt_public_key":"pem","token_expiration_buffer":30}"#,
        )
        .unwrap();
        assert_eq!(request.auth_mode, AuthMode::Hosted);
        assert_eq!(request.validation_type, Some(ValidationType::Rsa));
        assert_eq!(request.public_key.as_deref(), Some("pem"));
        assert_eq!(request.expiration_buffer_seconds, Some(30));
    }
}
