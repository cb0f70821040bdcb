// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

/// Liveness response with a few process counters.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    /// Clients currently tracked by the rate limiter.
    pub rate_limit_clients: usize,
    /// JWKS endpoints registered for background refresh.
    pub jwks_endpoints: usize,
}

/// Always returns 200 while the process is running.
#[utoipa::path(
    get,
    path = "/healthz",
    tag = "Health",
    responses((status = 200, description = "Service is alive", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        rate_limit_clients: state.rate_limiter.visitor_count(),
        jwks_endpoints: state.jwks().len(),
    })
}
