//! Rate limiting for contact-form submissions.
//!
//! Each client gets a counter in the shared cache. Every allowed submission
//! bumps the counter and pushes its expiry out by another window, so a client
//! has to go quiet for a full window before the count resets.

use std::sync::Arc;

use actix_web::http::{Method, StatusCode};
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::core::cache::{Cache, CacheError};
use crate::utils::format_cache_key;

/// Submissions allowed per client within one window
pub const CONTACT_RATE_LIMIT: u64 = 10;

/// Window length in seconds
pub const CONTACT_RATE_WINDOW_SECONDS: u64 = 3600;

/// The only rate limited endpoint
pub const CONTACT_PATH: &str = "/contact/";

/// Errors that can occur during rate limiting operations
#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("Cache error: {0}")]
    CacheError(#[from] CacheError),
    #[error("Rate limit exceeded. Please try again later.")]
    ExceededLimit,
}

impl ResponseError for RateLimitError {
    fn status_code(&self) -> StatusCode {
        match self {
            RateLimitError::CacheError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RateLimitError::ExceededLimit => StatusCode::FORBIDDEN,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            RateLimitError::CacheError(_) => "Internal Server Error".to_string(),
            RateLimitError::ExceededLimit => self.to_string(),
        };
        HttpResponse::build(self.status_code())
            .content_type("text/plain; charset=utf-8")
            .body(body)
    }
}

/// Rate limiter backed by the shared cache
pub struct RateLimiter {
    cache: Arc<dyn Cache>,
}

impl RateLimiter {
    /// Create a new rate limiter instance
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    /// Whether a request is subject to rate limiting
    pub fn applies_to(method: &Method, path: &str) -> bool {
        *method == Method::POST && path == CONTACT_PATH
    }

    /// Check if a request should be rate limited
    ///
    /// # Arguments
    ///
    /// * `client_id` - The client to rate limit
    ///
    /// # Returns
    ///
    /// * `Ok(count)` with the submissions recorded in the current window
    /// * `Err(RateLimitError::ExceededLimit)` if the limit was already reached; the counter is
    ///   untouched
    /// * `Err(RateLimitError::CacheError)` if the cache could not be reached
    pub async fn check_rate_limit(&self, client_id: &str) -> Result<u64, RateLimitError> {
        let key = format_cache_key("rate_limit", client_id);
        self.cache
            .increment_below(&key, CONTACT_RATE_LIMIT, CONTACT_RATE_WINDOW_SECONDS)
            .await?
            .ok_or(RateLimitError::ExceededLimit)
    }
}
