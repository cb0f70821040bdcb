// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! A single token bucket.

use std::time::{Duration, Instant};

/// Absorbs float error when a refill lands exactly on a whole token.
const EPSILON: f64 = 1e-9;

/// Token bucket refilled continuously at `per_minute / 60` tokens per second.
///
/// `tokens` stays within `0..=capacity`. Refill uses a monotonic clock, so a
/// `now` earlier than the last refill adds nothing.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    /// Tokens per second.
    rate: f64,
    tokens: f64,
    last_refill: Instant,
}

/// Outcome of a [`TokenBucket::try_take`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Take {
    pub allowed: bool,
    /// Tokens left after the attempt.
    pub tokens: f64,
    /// Seconds until one token is available (0 when allowed).
    pub retry_after_secs: f64,
}

impl TokenBucket {
    /// A full bucket allowing `per_minute` requests per minute.
    pub fn new(per_minute: u32, now: Instant) -> Self {
        let capacity = f64::from(per_minute.max(1));
        Self {
            capacity,
            rate: capacity / 60.0,
            tokens: capacity,
            last_refill: now,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity as u32
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn last_refill(&self) -> Instant {
        self.last_refill
    }

    /// Refill for the time elapsed since the last call, then try to take one
    /// token.
    pub fn try_take(&mut self, now: Instant) -> Take {
        self.refill(now);

        if self.tokens + EPSILON >= 1.0 {
            self.tokens = (self.tokens - 1.0).max(0.0);
            Take {
                allowed: true,
                tokens: self.tokens,
                retry_after_secs: 0.0,
            }
        } else {
            Take {
                allowed: false,
                tokens: self.tokens,
                retry_after_secs: (1.0 - self.tokens) / self.rate,
            }
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed: Duration = now.saturating_duration_since(self.last_refill);
        if elapsed.is_zero() {
            return;
        }
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.rate).min(self.capacity);
        self.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_full() {
        let now = Instant::now();
        let bucket = TokenBucket::new(5, now);
        assert_eq!(bucket.capacity(), 5);
        assert_eq!(bucket.tokens(), 5.0);
    }

    #[test]
    fn drains_then_denies() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(3, now);
        for _ in 0..3 {
            assert!(bucket.try_take(now).allowed);
        }
        let denied = bucket.try_take(now);
        assert!(!denied.allowed);
        assert_eq!(denied.tokens, 0.0);
        // 3/min is one token every 20 seconds.
        assert!((denied.retry_after_secs - 20.0).abs() < 1e-6);
    }

    #[test]
    fn refills_over_time_up_to_capacity() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(60, start);
        for _ in 0..60 {
            assert!(bucket.try_take(start).allowed);
        }
        assert!(!bucket.try_take(start).allowed);

        assert!(bucket.try_take(start + Duration::from_secs(1)).allowed);

        bucket.try_take(start + Duration::from_secs(3600));
        assert!(bucket.tokens() <= 60.0);
        assert!(bucket.tokens() >= 58.0);
    }

    #[test]
    fn clock_going_backwards_adds_nothing() {
        let start = Instant::now() + Duration::from_secs(10);
        let mut bucket = TokenBucket::new(1, start);
        assert!(bucket.try_take(start).allowed);

        let earlier = start - Duration::from_secs(5);
        assert!(!bucket.try_take(earlier).allowed);
        assert_eq!(bucket.last_refill(), start);
    }

    #[test]
    fn tokens_never_negative() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(1, now);
        for _ in 0..10 {
            bucket.try_take(now);
            assert!(bucket.tokens() >= 0.0);
        }
    }
}
