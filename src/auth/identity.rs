// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token claims and the authenticated caller's identity.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::error::ValidationError;

/// Name of the nested claim object carrying the commenter profile.
pub const USER_CLAIM: &str = "kotomi_user";

/// Authenticated caller extracted from a validated token.
///
/// Built per request and attached to the request extensions by the auth
/// middleware. Handlers read it through
/// [`current_identity`](super::middleware::current_identity) or the
/// [`AuthUser`](super::extractor::AuthUser) extractors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Identity {
    /// Canonical user ID (equal to the token subject).
    pub id: String,
    /// Display name.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    #[schema(value_type = Vec<String>)]
    pub roles: BTreeSet<String>,
}

impl Identity {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// The `kotomi_user` claim as it appears on the wire.
///
/// Every field is optional here so that a missing `id` or `name` surfaces as
/// [`ValidationError::MalformedClaims`] instead of a generic decode failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserClaim {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub profile_url: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Claims read from a verified token.
///
/// Registered claims (`exp`, `iss`, `aud`) are checked by `jsonwebtoken`
/// before this struct is produced; only what identity extraction needs is
/// kept.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default, rename = "kotomi_user")]
    pub user: Option<UserClaim>,
}

/// Only the expiry, read before the signature is checked.
#[derive(Debug, Deserialize)]
pub(crate) struct ExpiryClaim {
    #[serde(default)]
    pub exp: Option<i64>,
}

impl TryFrom<TokenClaims> for Identity {
    type Error = ValidationError;

    fn try_from(claims: TokenClaims) -> Result<Self, Self::Error> {
        let user = claims
            .user
            .ok_or_else(|| ValidationError::MalformedClaims(format!("missing {USER_CLAIM} claim")))?;

        let id = required(user.id, "id")?;
        let name = required(user.name, "name")?;

        if let Some(sub) = claims.sub.as_deref() {
            if sub != id {
                return Err(ValidationError::MalformedClaims(format!(
                    "{USER_CLAIM}.id does not match sub"
                )));
            }
        }

        Ok(Identity {
            id,
            name,
            email: user.email.filter(|v| !v.is_empty()),
            avatar_url: user.avatar_url.filter(|v| !v.is_empty()),
            profile_url: user.profile_url.filter(|v| !v.is_empty()),
            verified: user.verified,
            roles: user.roles.into_iter().collect(),
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, ValidationError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ValidationError::MalformedClaims(format!("missing {USER_CLAIM}.{field}")))
}
