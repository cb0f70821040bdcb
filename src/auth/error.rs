// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.
//!
//! [`ValidationError`] is what the JWT validator reports; its variants are
//! precise and only ever logged. [`AuthError`] is what the middleware
//! returns to the client. Every token failure renders the same body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Why a token was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Signature did not verify, wrong algorithm, or the token is not a JWT.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    /// `exp + expiration_buffer_seconds` is in the past.
    #[error("token has expired")]
    Expired,
    /// Issuer or audience does not match the site configuration.
    #[error("claim mismatch: {0}")]
    ClaimMismatch(String),
    /// Required claims (user `id` / `name`, `exp`) are missing or mistyped.
    #[error("malformed claims: {0}")]
    MalformedClaims(String),
    /// Verification key could not be resolved (bad PEM, JWKS not loaded yet).
    #[error("signing key unavailable: {0}")]
    KeyUnavailable(String),
}

impl ValidationError {
    /// Short machine-readable kind, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::InvalidSignature(_) => "invalid_signature",
            ValidationError::Expired => "expired",
            ValidationError::ClaimMismatch(_) => "claim_mismatch",
            ValidationError::MalformedClaims(_) => "malformed_claims",
            ValidationError::KeyUnavailable(_) => "key_unavailable",
        }
    }
}

/// Authentication error returned by the middleware.
#[derive(Debug)]
pub enum AuthError {
    /// Route has no `siteId` parameter (a routing error, not an auth error)
    SiteIdMissing,
    /// Site has no authentication configuration
    ConfigNotFound,
    /// No bearer token (or hosted-mode cookie) on the request
    TokenMissing,
    /// Token failed validation
    TokenInvalid(ValidationError),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: &'static str,
}

impl AuthError {
    /// Get the error code for this error (server-side logs only).
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::SiteIdMissing => "site_id_missing",
            AuthError::ConfigNotFound => "config_not_found",
            AuthError::TokenMissing => "token_missing",
            AuthError::TokenInvalid(e) => e.kind(),
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::SiteIdMissing => StatusCode::BAD_REQUEST,
            AuthError::ConfigNotFound | AuthError::TokenMissing | AuthError::TokenInvalid(_) => {
                StatusCode::UNAUTHORIZED
            }
        }
    }

    /// Message shown to the client. Never includes validation detail.
    pub fn public_message(&self) -> &'static str {
        match self {
            AuthError::SiteIdMissing => "Site ID not found in request",
            AuthError::ConfigNotFound => "Authentication not configured for this site",
            AuthError::TokenMissing => "Authorization token required",
            AuthError::TokenInvalid(_) => "Invalid or expired token",
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::TokenInvalid(e) => write!(f, "Invalid token: {e}"),
            other => write!(f, "{}", other.public_message()),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<ValidationError> for AuthError {
    fn from(e: ValidationError) -> Self {
        AuthError::TokenInvalid(e)
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.public_message(),
        });
        (status, body).into_response()
    }
}
