// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Request, Response},
    routing::{get, post},
    Json, Router,
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use kotomi_rust_server::{
    auth::{with_optional_auth, with_required_auth, AuthUser, MaybeAuthUser},
    models::{AuthMode, SiteAuthConfigRequest, ValidationType},
    state::AppState,
};
use serde_json::{json, Value};

pub const SECRET: &str = "integration-secret-long-enough-for-hs256";
pub const ADMIN_TOKEN: &str = "admin-test-token";
pub const RSA_PRIVATE_PEM: &str = include_str!("../fixtures/rsa_private.pem");
pub const RSA_PUBLIC_PEM: &str = include_str!("../fixtures/rsa_public.pem");

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn claims(exp_offset: i64) -> Value {
    json!({
        "iss": "https://example.com",
        "aud": "kotomi",
        "sub": "u1",
        "iat": now(),
        "exp": now() + exp_offset,
        "kotomi_user": { "id": "u1", "name": "Ann", "email": "ann@example.com" }
    })
}

pub fn hmac_token(secret: &str, claims: &Value) -> String {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

pub fn rsa_token(claims: &Value) -> String {
    let key = EncodingKey::from_rsa_pem(RSA_PRIVATE_PEM.as_bytes()).unwrap();
    encode(&Header::new(Algorithm::RS256), claims, &key).unwrap()
}

pub fn hmac_site(state: &AppState, site_id: &str, auth_mode: AuthMode) {
    state
        .auth_configs
        .create(
            site_id,
            SiteAuthConfigRequest {
                auth_mode,
                validation_type: Some(ValidationType::Hmac),
                secret: Some(SECRET.to_string()),
                issuer: Some("https://example.com".to_string()),
                audience: Some("kotomi".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
}

pub fn rsa_site(state: &AppState, site_id: &str) {
    state
        .auth_configs
        .create(
            site_id,
            SiteAuthConfigRequest {
                validation_type: Some(ValidationType::Rsa),
                public_key: Some(RSA_PUBLIC_PEM.to_string()),
                ..Default::default()
            },
        )
        .unwrap();
}

async fn create_comment(AuthUser(user): AuthUser) -> Json<Value> {
    Json(json!({ "author": user.id, "name": user.name }))
}

async fn list_comments(MaybeAuthUser(user): MaybeAuthUser) -> Json<Value> {
    Json(json!({ "viewer": user.map(|u| u.id) }))
}

/// A stand-in comment API guarded the way real write/read routes are.
pub fn comment_app(state: AppState) -> Router {
    let writes = with_required_auth(
        Router::new().route("/api/v1/site/{siteId}/comments", post(create_comment)),
        &state,
    );
    let reads = with_optional_auth(
        Router::new().route("/api/v1/site/{siteId}/pages/comments", get(list_comments)),
        &state,
    );
    let misrouted = with_required_auth(
        Router::new().route("/api/v1/comments", post(create_comment)),
        &state,
    );

    writes.merge(reads).merge(misrouted).with_state(state)
}

pub fn request(method: &str, uri: &str) -> axum::http::request::Builder {
    Request::builder().method(method).uri(uri)
}

pub fn bearer(method: &str, uri: &str, token: &str) -> Request<Body> {
    request(method, uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap()
}
