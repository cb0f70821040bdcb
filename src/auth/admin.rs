// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared admin token for the configuration API.
//!
//! The admin API is disabled when no token is configured.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const TAG_KEY: &[u8] = b"kotomi-admin-token";

/// Configured admin token, stored as an HMAC tag so comparison is
/// constant-time regardless of the presented token's length.
#[derive(Clone, Default)]
pub struct AdminToken {
    tag: Option<Vec<u8>>,
}

impl AdminToken {
    pub fn new(token: Option<&str>) -> Self {
        Self {
            tag: token.filter(|t| !t.is_empty()).map(tag),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.tag.is_some()
    }

    /// Whether `presented` matches the configured token.
    pub fn verify(&self, presented: &str) -> bool {
        let Some(expected) = &self.tag else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(TAG_KEY) else {
            return false;
        };
        mac.update(presented.as_bytes());
        mac.verify_slice(expected).is_ok()
    }
}

impl std::fmt::Debug for AdminToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminToken")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

fn tag(token: &str) -> Vec<u8> {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(TAG_KEY) {
        Ok(mac) => mac,
        Err(_) => return Vec::new(),
    };
    mac.update(token.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_matching_token() {
        let admin = AdminToken::new(Some("let-me-in"));
        assert!(admin.is_enabled());
        assert!(admin.verify("let-me-in"));
        assert!(!admin.verify("let-me-in!"));
        assert!(!admin.verify(""));
    }

    #[test]
    fn disabled_rejects_everything() {
        let admin = AdminToken::new(None);
        assert!(!admin.is_enabled());
        assert!(!admin.verify(""));
        assert!(!AdminToken::new(Some("")).is_enabled());
    }

    #[test]
    fn debug_hides_token() {
        let debug = format!("{:?}", AdminToken::new(Some("let-me-in")));
        assert!(!debug.contains("let-me-in"));
    }
}
