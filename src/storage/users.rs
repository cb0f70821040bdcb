// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User profile store.
//!
//! Authenticated commenters are upserted here after a successful token
//! validation. The auth middleware treats this as best-effort: a failing
//! store is logged and never fails the request.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::auth::Identity;

/// Errors raised by a user profile backend.
#[derive(Debug, Error)]
pub enum UserStoreError {
    #[error("user store unavailable: {0}")]
    Unavailable(String),
}

/// A commenter profile, scoped to the site it authenticated against.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct UserProfile {
    pub id: String,
    pub site_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
    pub is_verified: bool,
    pub roles: Vec<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Persistence seam for commenter profiles.
pub trait UserStore: Send + Sync {
    /// Insert or refresh the profile for `identity` on `site_id`.
    fn create_or_update(&self, site_id: &str, identity: &Identity) -> Result<UserProfile, UserStoreError>;

    /// Look up a profile.
    fn get(&self, site_id: &str, user_id: &str) -> Option<UserProfile>;
}

/// Process-local [`UserStore`].
#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<(String, String), UserProfile>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserStore for InMemoryUserStore {
    fn create_or_update(&self, site_id: &str, identity: &Identity) -> Result<UserProfile, UserStoreError> {
        let now = Utc::now();
        let key = (site_id.to_string(), identity.id.clone());
        let mut users = self.users.write();

        let first_seen = users.get(&key).map(|u| u.first_seen).unwrap_or(now);
        let profile = UserProfile {
            id: identity.id.clone(),
            site_id: site_id.to_string(),
            name: identity.name.clone(),
            email: identity.email.clone(),
            avatar_url: identity.avatar_url.clone(),
            profile_url: identity.profile_url.clone(),
            is_verified: identity.verified,
            roles: identity.roles.iter().cloned().collect(),
            first_seen,
            last_seen: now,
        };
        users.insert(key, profile.clone());
        Ok(profile)
    }

    fn get(&self, site_id: &str, user_id: &str) -> Option<UserProfile> {
        self.users
            .read()
            .get(&(site_id.to_string(), user_id.to_string()))
            .cloned()
    }
}
