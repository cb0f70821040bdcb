// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Rate Limiting
//!
//! Per-client token buckets, one for reads and one for writes.
//!
//! ## Concurrency
//!
//! Visitors live in a sharded [`DashMap`]; each visitor sits behind its own
//! mutex so the refill-check-take sequence is atomic for that client while
//! other clients proceed in parallel. Map shard locks are never held while a
//! bucket lock is taken.
//!
//! ## Memory
//!
//! [`RateLimiter::run_sweeper`] evicts visitors idle for longer than the
//! idle window.

pub mod bucket;
pub mod middleware;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::Method;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub use bucket::TokenBucket;
pub use middleware::rate_limit;

/// Default read-class budget (requests per minute).
pub const DEFAULT_READ_PER_MINUTE: u32 = 100;
/// Default write-class budget (requests per minute).
pub const DEFAULT_WRITE_PER_MINUTE: u32 = 5;
/// Default idle time after which a visitor is forgotten.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(600);
/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Which bucket a request draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestClass {
    Read,
    Write,
}

impl RequestClass {
    /// POST/PUT/DELETE/PATCH are writes; everything else reads.
    pub fn from_method(method: &Method) -> Self {
        match *method {
            Method::POST | Method::PUT | Method::DELETE | Method::PATCH => RequestClass::Write,
            _ => RequestClass::Read,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub read_per_minute: u32,
    pub write_per_minute: u32,
    pub idle_timeout: Duration,
    pub sweep_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            read_per_minute: DEFAULT_READ_PER_MINUTE,
            write_per_minute: DEFAULT_WRITE_PER_MINUTE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Admission decision for one request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub allowed: bool,
    /// Bucket capacity (requests per minute).
    pub limit: u32,
    /// Whole tokens left, never negative.
    pub remaining: u32,
    /// Seconds until the next token; 0 when allowed.
    pub retry_after_secs: f64,
}

impl Decision {
    /// `Retry-After` header value: whole seconds, at least 1.
    pub fn retry_after_header(&self) -> u64 {
        ((self.retry_after_secs - 1e-9).ceil() as u64).max(1)
    }
}

struct Visitor {
    read: TokenBucket,
    write: TokenBucket,
    last_seen: Instant,
}

impl Visitor {
    fn new(config: &RateLimitConfig, now: Instant) -> Self {
        Self {
            read: TokenBucket::new(config.read_per_minute, now),
            write: TokenBucket::new(config.write_per_minute, now),
            last_seen: now,
        }
    }
}

/// Per-client admission control. Construct once and share through `Arc`.
pub struct RateLimiter {
    config: RateLimitConfig,
    visitors: DashMap<String, Arc<Mutex<Visitor>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        info!(
            read_per_minute = config.read_per_minute,
            write_per_minute = config.write_per_minute,
            "Rate limiter configured"
        );
        Self {
            config,
            visitors: DashMap::new(),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Admit or deny one request from `client`.
    pub fn allow(&self, client: &str, class: RequestClass) -> Decision {
        self.allow_at(client, class, Instant::now())
    }

    /// [`allow`](Self::allow) at an explicit instant.
    pub fn allow_at(&self, client: &str, class: RequestClass, now: Instant) -> Decision {
        let visitor = self.visitor(client, now);
        let mut visitor = visitor.lock();
        visitor.last_seen = now;

        let bucket = match class {
            RequestClass::Read => &mut visitor.read,
            RequestClass::Write => &mut visitor.write,
        };
        let take = bucket.try_take(now);

        Decision {
            allowed: take.allowed,
            limit: bucket.capacity(),
            remaining: take.tokens.max(0.0).floor() as u32,
            retry_after_secs: take.retry_after_secs,
        }
    }

    /// Number of tracked clients.
    pub fn visitor_count(&self) -> usize {
        self.visitors.len()
    }

    /// Drop visitors not seen since `now - idle_timeout`. Returns how many
    /// were removed.
    pub fn evict_idle(&self, now: Instant) -> usize {
        let before = self.visitors.len();
        let idle = self.config.idle_timeout;
        self.visitors.retain(|_, visitor| {
            now.saturating_duration_since(visitor.lock().last_seen) < idle
        });
        before.saturating_sub(self.visitors.len())
    }

    /// Evict idle visitors every sweep interval until cancelled.
    pub async fn run_sweeper(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            interval_secs = self.config.sweep_interval.as_secs(),
            idle_secs = self.config.idle_timeout.as_secs(),
            "Rate limit sweeper starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.sweep_interval) => {
                    let evicted = self.evict_idle(Instant::now());
                    if evicted > 0 {
                        debug!(evicted, remaining = self.visitor_count(), "Evicted idle rate limit visitors");
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("Rate limit sweeper shutting down");
                    return;
                }
            }
        }
    }

    fn visitor(&self, client: &str, now: Instant) -> Arc<Mutex<Visitor>> {
        if let Some(visitor) = self.visitors.get(client) {
            return visitor.clone();
        }
        self.visitors
            .entry(client.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Visitor::new(&self.config, now))))
            .clone()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
