// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Per-site JWT authentication for the Kotomi comment API.
//!
//! ## Auth Flow
//!
//! 1. A site's users obtain a JWT from the site's identity provider (or the
//!    hosted login flow)
//! 2. The embed sends `Authorization: Bearer <JWT>` (hosted sites may rely
//!    on the `kotomi_auth_token` cookie instead)
//! 3. The middleware:
//!    - resolves the site from the `{siteId}` route parameter
//!    - loads the site's [`SiteAuthConfig`](crate::models::SiteAuthConfig)
//!    - verifies signature, expiry (with grace period), issuer, audience
//!    - extracts the `kotomi_user` claim into an [`Identity`]
//!
//! ## Security
//!
//! - Every token failure returns the same 401 body; the precise reason is
//!   logged with the request ID
//! - Each site accepts only the algorithm family it is configured for
//! - JWKS keys are refreshed in the background; requests never fetch

pub mod admin;
pub mod error;
pub mod extractor;
pub mod identity;
pub mod jwks;
pub mod middleware;
pub mod strategy;
pub mod validator;

#[cfg(test)]
pub(crate) mod testutil;

pub use admin::AdminToken;
pub use error::{AuthError, ValidationError};
pub use extractor::{AdminOnly, AuthUser, MaybeAuthUser};
pub use identity::Identity;
pub use jwks::{JwksManager, JwksRegistry};
pub use middleware::{current_identity, optional_auth, require_auth, with_optional_auth, with_required_auth};
pub use validator::JwtValidator;
