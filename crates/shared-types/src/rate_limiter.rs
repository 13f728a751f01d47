//! # Token Bucket
//!
//! The per-(peer, class) bucket used by admission control.
//!
//! ## Algorithm
//!
//! - Tokens are added at a fixed rate
//! - Each message consumes one token
//! - Messages are rejected when no tokens are available
//!
//! Tokens are counted in integer milli-tokens and time in milliseconds, so
//! `elapsed_ms * refill_per_sec` is exact: one full refill interval
//! (`capacity / refill_per_sec` seconds) restores exactly `capacity` tokens
//! with no floating-point drift.

use crate::time::Timestamp;

const MILLI: u64 = 1_000;

/// Token bucket with an injected clock.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    /// Maximum tokens in bucket (milli-tokens).
    capacity: u64,
    /// Tokens to add per second.
    refill_per_sec: u64,
    /// Current token count (milli-tokens).
    tokens: u64,
    /// Last refill time.
    last_refill: Timestamp,
}

impl TokenBucket {
    /// Create a full bucket.
    ///
    /// # Parameters
    ///
    /// - `capacity`: Maximum burst size
    /// - `refill_per_sec`: Tokens per second
    pub fn new(capacity: u64, refill_per_sec: u64, now: Timestamp) -> Self {
        let capacity = capacity.saturating_mul(MILLI);
        Self {
            capacity,
            refill_per_sec,
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Try to take one token.
    ///
    /// Returns `true` if the message is admitted, `false` if rate limited.
    pub fn try_acquire(&mut self, now: Timestamp) -> bool {
        self.refill(now);

        if self.tokens < MILLI {
            return false;
        }
        self.tokens -= MILLI;
        true
    }

    /// Refill tokens based on elapsed time.
    fn refill(&mut self, now: Timestamp) {
        if now <= self.last_refill {
            return;
        }
        let elapsed_ms = now.as_millis() - self.last_refill.as_millis();
        let added = elapsed_ms.saturating_mul(self.refill_per_sec);
        self.tokens = self.tokens.saturating_add(added).min(self.capacity);
        self.last_refill = now;
    }

    /// Whole tokens currently available.
    pub fn available(&mut self, now: Timestamp) -> u64 {
        self.refill(now);
        self.tokens / MILLI
    }

    /// Check if rate limited without consuming a token.
    pub fn is_limited(&mut self, now: Timestamp) -> bool {
        self.available(now) == 0
    }

    /// When the bucket was last refilled (its last use).
    pub fn last_refill(&self) -> Timestamp {
        self.last_refill
    }
}
