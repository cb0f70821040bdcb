// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Keys and token builders shared by unit tests.

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};

pub const HMAC_SECRET: &str = "test-secret-that-is-long-enough-for-hs256";

pub const RSA_PRIVATE_PEM: &str = include_str!("../../tests/fixtures/rsa_private.pem");

pub const RSA_PUBLIC_PEM: &str = include_str!("../../tests/fixtures/rsa_public.pem");

/// Base64url modulus of [`RSA_PUBLIC_PEM`].
pub const RSA_N: &str = "zD6PeOnnJS5g4gDSlEQ1PAYRR7QSrjNmfiNc3s_VSy7K1rKpSffLNfb4YeVnwjF9KcussWOWMu9XXojpJGFpvq9K-xJBt-iRKYSwyjwMx7ppSQN8ELUes4Sym4ndSIM_ImNctO4ELiirFDiCSGM4GGu-kpfOSWfI-JSvQFoYJ1dae_X2WaxpEXlGm0qnYrAFzagYXrNzmSNDb4_Jcrj3RWsNcnjNQDK0jZybI6Pt0EI5FnUY_kvf-iUuTi4bK2F-GCskkiEKKqSxq9hEWrJ7Rtr8251Uj2CfS-YBc4JN1Z87FJ-Tw8RPm2k7lgwfj06MiWUZIm3WPgc_ZKvSMAg3Iw";
pub const RSA_E: &str = "AQAB";

pub const EC_PRIVATE_PEM: &str = include_str!("../../tests/fixtures/ec_private.pem");

pub const EC_PUBLIC_PEM: &str = include_str!("../../tests/fixtures/ec_public.pem");

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Claims for user `u1` / `Ann`, issued by `https://example.com` for `kotomi`,
/// expiring `exp_offset` seconds from now.
pub fn claims(exp_offset: i64) -> Value {
    json!({
        "iss": "https://example.com",
        "aud": "kotomi",
        "sub": "u1",
        "iat": now(),
        "exp": now() + exp_offset,
        "kotomi_user": { "id": "u1", "name": "Ann" }
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

pub fn rsa_token(kid: Option<&str>, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    let key = EncodingKey::from_rsa_pem(RSA_PRIVATE_PEM.as_bytes()).unwrap();
    encode(&header, claims, &key).unwrap()
}

pub fn ec_token(claims: &Value) -> String {
    let key = EncodingKey::from_ec_pem(EC_PRIVATE_PEM.as_bytes()).unwrap();
    encode(&Header::new(Algorithm::ES256), claims, &key).unwrap()
}

/// A key set holding [`RSA_PUBLIC_PEM`] under `kid`.
pub fn rsa_jwks(kid: &str) -> JwkSet {
    serde_json::from_value(json!({
        "keys": [{
            "kty": "RSA",
            "kid": kid,
            "alg": "RS256",
            "use": "sig",
            "n": RSA_N,
            "e": RSA_E
        }]
    }))
    .unwrap()
}

/// Serve `jwks` at `/jwks.json` on an ephemeral local port and return its URL.
pub async fn serve_jwks(jwks: JwkSet) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = axum::Router::new().route(
        "/jwks.json",
        axum::routing::get(move || {
            let jwks = jwks.clone();
            async move { axum::Json(jwks) }
        }),
    );
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/jwks.json")
}
