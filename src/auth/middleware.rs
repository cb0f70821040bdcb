// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication middleware for Axum.
//!
//! Per request:
//!
//! ```text
//! ResolveTenant -> ResolveConfig -> ExtractToken -> Validate -> Attach | Reject
//! ```
//!
//! Two variants are exposed:
//!
//! - [`require_auth`]: a missing token is rejected with 401
//! - [`optional_auth`]: a missing token passes through anonymously; a token
//!   that is present must still be valid
//!
//! Both need the `{siteId}` path parameter, so they are installed with
//! `route_layer` (see [`with_required_auth`]).
//!
//! ```rust,ignore
//! let writes = Router::new().route("/site/{siteId}/comments", post(create_comment));
//! let writes = with_required_auth(writes, &state);
//! ```

use axum::{
    extract::{rejection::RawPathParamsRejection, RawPathParams, Request, State},
    http::{
        header::{AUTHORIZATION, COOKIE},
        Extensions, HeaderMap,
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use tracing::{debug, error, warn};

use super::error::AuthError;
use super::identity::Identity;
use crate::models::{AuthMode, SiteAuthConfig};
use crate::state::AppState;
use crate::storage::StoreError;

/// Session cookie read for hosted-mode sites when no bearer token is sent.
pub const AUTH_COOKIE: &str = "kotomi_auth_token";

/// Route parameter names that carry the site ID.
const SITE_ID_PARAMS: &[&str] = &["siteId", "site_id"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Requirement {
    Required,
    Optional,
}

/// Reject requests without a valid token.
pub async fn require_auth(
    State(state): State<AppState>,
    params: Result<RawPathParams, RawPathParamsRejection>,
    request: Request,
    next: Next,
) -> Response {
    authenticate(Requirement::Required, state, params.ok(), request, next).await
}

/// Attach an identity when a valid token is sent; pass anonymous requests
/// through untouched.
pub async fn optional_auth(
    State(state): State<AppState>,
    params: Result<RawPathParams, RawPathParamsRejection>,
    request: Request,
    next: Next,
) -> Response {
    authenticate(Requirement::Optional, state, params.ok(), request, next).await
}

/// Protect every route of `router` with [`require_auth`].
pub fn with_required_auth(router: Router<AppState>, state: &AppState) -> Router<AppState> {
    router.route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
}

/// Install [`optional_auth`] on every route of `router`.
pub fn with_optional_auth(router: Router<AppState>, state: &AppState) -> Router<AppState> {
    router.route_layer(middleware::from_fn_with_state(state.clone(), optional_auth))
}

/// Identity attached by the middleware, if any.
///
/// `None` on an optional-auth route means an anonymous caller.
pub fn current_identity(extensions: &Extensions) -> Option<&Identity> {
    extensions.get::<Identity>()
}

async fn authenticate(
    requirement: Requirement,
    state: AppState,
    params: Option<RawPathParams>,
    mut request: Request,
    next: Next,
) -> Response {
    let request_id = request_id(request.headers());

    let Some(site_id) = params.as_ref().and_then(site_id_param) else {
        warn!(request_id = %request_id, "Auth middleware mounted on a route without siteId");
        return AuthError::SiteIdMissing.into_response();
    };

    let config = match state.auth_configs.get_by_site_id(&site_id) {
        Ok(config) => Some(config),
        Err(StoreError::NotFound(_)) => None,
        Err(e) => {
            // Fails closed: an unreadable config rejects like a missing one.
            error!(request_id = %request_id, site_id = %site_id, error = %e, "Failed to load site auth config");
            None
        }
    };
    let token = extract_token(request.headers(), config.as_ref());

    let (config, token) = match (config, token) {
        (_, None) if requirement == Requirement::Optional => {
            debug!(request_id = %request_id, site_id = %site_id, "Anonymous request");
            return next.run(request).await;
        }
        (None, _) => return reject(AuthError::ConfigNotFound, &request_id, &site_id),
        (Some(_), None) => return reject(AuthError::TokenMissing, &request_id, &site_id),
        (Some(config), Some(token)) => (config, token),
    };

    let identity = match state.validator.validate_token(&token, &config) {
        Ok(identity) => identity,
        Err(e) => return reject(AuthError::TokenInvalid(e), &request_id, &site_id),
    };

    debug!(
        request_id = %request_id,
        site_id = %site_id,
        user_id = %identity.id,
        "Authenticated request"
    );

    record_user(&state, &site_id, &identity);
    request.extensions_mut().insert(identity);
    next.run(request).await
}

fn reject(error: AuthError, request_id: &str, site_id: &str) -> Response {
    warn!(
        request_id = %request_id,
        site_id = %site_id,
        error_kind = error.error_code(),
        error = %error,
        "Authentication failed"
    );
    error.into_response()
}

/// Upsert the caller's profile without holding up the request.
fn record_user(state: &AppState, site_id: &str, identity: &Identity) {
    let users = state.users.clone();
    let site_id = site_id.to_string();
    let identity = identity.clone();

    tokio::task::spawn_blocking(move || {
        if let Err(e) = users.create_or_update(&site_id, &identity) {
            warn!(site_id = %site_id, user_id = %identity.id, error = %e, "Failed to record user profile");
        }
    });
}

fn site_id_param(params: &RawPathParams) -> Option<String> {
    params
        .iter()
        .find(|(name, _)| SITE_ID_PARAMS.contains(name))
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// Bearer token from `Authorization`, falling back to the session cookie
/// for hosted-mode sites.
pub fn extract_token(headers: &HeaderMap, config: Option<&SiteAuthConfig>) -> Option<String> {
    if let Some(token) = bearer_token(headers) {
        return Some(token);
    }

    match config {
        Some(config) if config.auth_mode == AuthMode::Hosted => cookie_value(headers, AUTH_COOKIE),
        _ => None,
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn request_id(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string()
}
