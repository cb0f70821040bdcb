// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Admin CRUD for per-site auth configuration.
//!
//! Every response uses [`SiteAuthConfigView`]; stored secrets never leave
//! the server.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::{info, warn};

use crate::{
    auth::AdminOnly,
    error::ApiError,
    models::{SiteAuthConfig, SiteAuthConfigRequest, SiteAuthConfigView},
    state::AppState,
};

#[utoipa::path(
    get,
    path = "/admin/sites/{siteId}/auth/config",
    params(("siteId" = String, Path, description = "Site identifier")),
    tag = "Admin",
    responses(
        (status = 200, body = SiteAuthConfigView),
        (status = 401, description = "Missing or invalid admin token"),
        (status = 404, description = "Site has no auth configuration")
    )
)]
pub async fn get_auth_config(
    _admin: AdminOnly,
    Path(site_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<SiteAuthConfigView>, ApiError> {
    let config = state.auth_configs.get_by_site_id(&site_id)?;
    Ok(Json(config.view()))
}

#[utoipa::path(
    post,
    path = "/admin/sites/{siteId}/auth/config",
    params(("siteId" = String, Path, description = "Site identifier")),
    request_body = SiteAuthConfigRequest,
    tag = "Admin",
    responses(
        (status = 201, body = SiteAuthConfigView),
        (status = 400, description = "Invalid configuration"),
        (status = 401, description = "Missing or invalid admin token"),
        (status = 409, description = "Site already has an auth configuration")
    )
)]
pub async fn create_auth_config(
    _admin: AdminOnly,
    Path(site_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<SiteAuthConfigRequest>,
) -> Result<(StatusCode, Json<SiteAuthConfigView>), ApiError> {
    let config = state.auth_configs.create(&site_id, request)?;
    on_saved(&state, &config);
    info!(site_id = %site_id, validation_type = %config.validation_type, "Created site auth config");
    Ok((StatusCode::CREATED, Json(config.view())))
}

#[utoipa::path(
    put,
    path = "/admin/sites/{siteId}/auth/config",
    params(("siteId" = String, Path, description = "Site identifier")),
    request_body = SiteAuthConfigRequest,
    tag = "Admin",
    responses(
        (status = 200, body = SiteAuthConfigView),
        (status = 400, description = "Invalid configuration"),
        (status = 401, description = "Missing or invalid admin token"),
        (status = 404, description = "Site has no auth configuration")
    )
)]
pub async fn update_auth_config(
    _admin: AdminOnly,
    Path(site_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<SiteAuthConfigRequest>,
) -> Result<Json<SiteAuthConfigView>, ApiError> {
    let config = state.auth_configs.update(&site_id, request)?;
    on_saved(&state, &config);
    drop_unused_jwks(&state);
    info!(site_id = %site_id, validation_type = %config.validation_type, "Updated site auth config");
    Ok(Json(config.view()))
}

#[utoipa::path(
    delete,
    path = "/admin/sites/{siteId}/auth/config",
    params(("siteId" = String, Path, description = "Site identifier")),
    tag = "Admin",
    responses(
        (status = 204),
        (status = 401, description = "Missing or invalid admin token"),
        (status = 404, description = "Site has no auth configuration")
    )
)]
pub async fn delete_auth_config(
    _admin: AdminOnly,
    Path(site_id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state.auth_configs.delete(&site_id)?;
    state.validator.invalidate(&site_id);
    drop_unused_jwks(&state);
    info!(site_id = %site_id, "Deleted site auth config");
    Ok(StatusCode::NO_CONTENT)
}

/// Register a JWKS endpoint right away so its first fetch does not wait for
/// the first token.
fn on_saved(state: &AppState, config: &SiteAuthConfig) {
    if let Some(url) = &config.jwks_endpoint {
        state.jwks().manager_for(url);
    }
}

/// Stop polling endpoints that no site points at any more.
fn drop_unused_jwks(state: &AppState) {
    match state.prune_jwks() {
        Ok(0) => {}
        Ok(dropped) => info!(dropped, "Pruned unused JWKS endpoints"),
        Err(e) => warn!(error = %e, "Failed to prune JWKS endpoints"),
    }
}
