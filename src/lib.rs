// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Kotomi - Request Authorization & Admission Control
//!
//! This crate guards the multi-tenant Kotomi comment API: per-site JWT
//! validation and per-client token-bucket rate limiting.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Per-site JWT authentication (HMAC, RSA, ECDSA, JWKS)
//! - `rate_limit` - Token-bucket admission control
//! - `storage` - Site auth configuration and user profile stores

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod rate_limit;
pub mod state;
pub mod storage;
