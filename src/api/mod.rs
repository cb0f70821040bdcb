// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::get,
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{with_optional_auth, Identity},
    models::{AuthMode, PublicAuthInfo, SiteAuthConfigRequest, SiteAuthConfigView, ValidationType},
    rate_limit::rate_limit,
    state::AppState,
};

pub mod auth_config;
pub mod health;
pub mod public;

/// Router with permissive CORS.
pub fn router(state: AppState) -> Router {
    router_with_cors(state, CorsLayer::permissive())
}

pub fn router_with_cors(state: AppState, cors: CorsLayer) -> Router {
    // `route_layer` only wraps routes registered before it.
    let current_user = Router::new().route("/site/{siteId}/auth/user", get(public::get_current_user));
    let v1_routes = with_optional_auth(current_user, &state)
        .route(
            "/site/{siteId}/auth/config",
            get(public::get_public_auth_config),
        )
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit,
        ));

    let admin_routes = Router::new().route(
        "/admin/sites/{siteId}/auth/config",
        get(auth_config::get_auth_config)
            .post(auth_config::create_auth_config)
            .put(auth_config::update_auth_config)
            .delete(auth_config::delete_auth_config),
    );

    Router::new()
        .nest("/api/v1", v1_routes)
        .merge(admin_routes)
        .route("/healthz", get(health::health))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

/// CORS for the widget origins; `None` allows any origin.
pub fn cors_layer(allowed_origins: Option<&[String]>) -> CorsLayer {
    let Some(origins) = allowed_origins else {
        return CorsLayer::permissive();
    };

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        public::get_public_auth_config,
        public::get_current_user,
        auth_config::get_auth_config,
        auth_config::create_auth_config,
        auth_config::update_auth_config,
        auth_config::delete_auth_config
    ),
    components(
        schemas(
            AuthMode,
            ValidationType,
            Identity,
            PublicAuthInfo,
            SiteAuthConfigRequest,
            SiteAuthConfigView,
            public::CurrentUserResponse,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Health", description = "Liveness"),
        (name = "Auth", description = "Per-site authentication discovery"),
        (name = "Admin", description = "Site auth configuration")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let app = router(AppState::in_memory().unwrap());
        // Ensure the router can be converted into a service without panicking.
        let _ = app.into_make_service();
    }

    #[test]
    fn openapi_lists_admin_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/admin/sites/{siteId}/auth/config"));
        assert!(doc.paths.paths.contains_key("/api/v1/site/{siteId}/auth/user"));
    }

    #[test]
    fn cors_layer_accepts_origin_list() {
        let origins = vec!["https://blog.example.com".to_string()];
        let _ = cors_layer(Some(&origins));
        let _ = cors_layer(None);
    }
}
