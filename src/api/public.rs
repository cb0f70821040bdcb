// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Public, per-site auth endpoints used by the comment widget.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::{Identity, MaybeAuthUser},
    error::ApiError,
    models::PublicAuthInfo,
    state::AppState,
};

/// The caller as seen by the server.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CurrentUserResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Identity>,
}

/// Which login flow a site uses. Never exposes key material.
#[utoipa::path(
    get,
    path = "/api/v1/site/{siteId}/auth/config",
    params(("siteId" = String, Path, description = "Site identifier")),
    tag = "Auth",
    responses(
        (status = 200, body = PublicAuthInfo),
        (status = 404, description = "Site has no auth configuration")
    )
)]
pub async fn get_public_auth_config(
    Path(site_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<PublicAuthInfo>, ApiError> {
    let config = state
        .auth_configs
        .get_by_site_id(&site_id)
        .map_err(|_| ApiError::not_found("Authentication not configured for this site"))?;

    Ok(Json(PublicAuthInfo {
        site_id: config.site_id,
        auth_mode: config.auth_mode,
    }))
}

/// Current caller; anonymous callers get `authenticated: false`.
#[utoipa::path(
    get,
    path = "/api/v1/site/{siteId}/auth/user",
    params(("siteId" = String, Path, description = "Site identifier")),
    tag = "Auth",
    responses(
        (status = 200, body = CurrentUserResponse),
        (status = 401, description = "A token was sent but is invalid")
    )
)]
pub async fn get_current_user(MaybeAuthUser(user): MaybeAuthUser) -> Json<CurrentUserResponse> {
    Json(CurrentUserResponse {
        authenticated: user.is_some(),
        user,
    })
}
