//! # Service Layer
//!
//! [`RateLimiter`]: token buckets keyed by (peer, class) with escalation
//! to a temporary block.

mod limiter;

pub use limiter::RateLimiter;
