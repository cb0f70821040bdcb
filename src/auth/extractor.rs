// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors over the identity attached by the auth middleware.
//!
//! ```rust,ignore
//! async fn create_comment(AuthUser(user): AuthUser) -> impl IntoResponse {
//!     // user is the validated Identity
//! }
//!
//! async fn list_comments(MaybeAuthUser(user): MaybeAuthUser) -> impl IntoResponse {
//!     // None for anonymous readers
//! }
//! ```
//!
//! Extractors never parse tokens; they only read request extensions.

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::error::AuthError;
use super::identity::Identity;
use super::middleware::current_identity;
use crate::error::ApiError;
use crate::state::AppState;

/// Caller identity on a route behind `require_auth`.
///
/// Rejects with 401 when no identity is attached.
pub struct AuthUser(pub Identity);

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        current_identity(&parts.extensions)
            .cloned()
            .map(AuthUser)
            .ok_or(AuthError::TokenMissing)
    }
}

/// Caller identity on a route behind `optional_auth`; `None` when anonymous.
pub struct MaybeAuthUser(pub Option<Identity>);

impl<S: Send + Sync> FromRequestParts<S> for MaybeAuthUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuthUser(current_identity(&parts.extensions).cloned()))
    }
}

/// Guard for the admin configuration API.
///
/// Requires `Authorization: Bearer <ADMIN_API_TOKEN>`.
pub struct AdminOnly;

impl FromRequestParts<AppState> for AdminOnly {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if !state.admin.is_enabled() {
            return Err(ApiError::unauthorized("Admin API is disabled"));
        }

        let presented = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split_once(' '))
            .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
            .map(|(_, token)| token.trim())
            .ok_or_else(|| ApiError::unauthorized("Admin token required"))?;

        if state.admin.verify(presented) {
            Ok(AdminOnly)
        } else {
            Err(ApiError::unauthorized("Invalid admin token"))
        }
    }
}
