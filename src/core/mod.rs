//! Core functionality for the portfolio request protection chain.
//!
//! This module contains the cache boundary, client identification,
//! suspicious activity detection, rate limiting, security headers and
//! origin validation.

pub mod cache;
pub mod client_ip;
pub mod detector;
pub mod headers;
pub mod origin;
pub mod rate_limiter;

pub use cache::{Cache, CacheError, MemoryCache, RedisCache};
pub use client_ip::ClientIdentity;
pub use detector::{
    classify, decode_path, Classification, RejectReason, SuspiciousActivityDetector,
    SuspiciousEvent,
};
pub use headers::apply_security_headers;
pub use origin::{is_same_origin, SameOriginGuard};
pub use rate_limiter::{RateLimitError, RateLimiter};
