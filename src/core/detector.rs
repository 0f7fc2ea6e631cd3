//! Suspicious activity detection.
//!
//! Requests are screened against static user-agent and path blocklists.
//! Matching is plain substring matching on the lower-cased, percent-decoded
//! input, so `/admin/config/` passes (it starts with `/admin/`) while
//! `/myconfig` or `/latest-news` are rejected.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{error, warn};
use metrics::increment_counter;
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};

use crate::core::cache::{Cache, CacheError};
use crate::utils::{format_cache_key, get_current_timestamp};

/// User-agent fragments of scrapers and scanners
pub const BLOCKED_USER_AGENTS: &[&str] = &[
    "bot", "crawler", "spider", "scraper", "scanner", "sqlmap", "nikto", "nmap", "masscan",
];

/// Path fragments of admin panels and leaked files
pub const BLOCKED_PATHS: &[&str] = &[
    "admin",
    "wp-admin",
    "phpmyadmin",
    "config",
    ".env",
    ".git",
    "backup",
    "test",
];

/// The site's own admin interface
pub const ADMIN_PREFIX: &str = "/admin/";

/// Audit records are kept for 24 hours
pub const AUDIT_TTL_SECONDS: u64 = 86_400;

/// Upper bound on how long a rejection waits for its audit write
pub const AUDIT_WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// Why a request was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    UserAgent(String),
    Path(String),
}

impl RejectReason {
    /// Metric label
    pub fn kind(&self) -> &'static str {
        match self {
            RejectReason::UserAgent(_) => "user_agent",
            RejectReason::Path(_) => "path",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::UserAgent(ua) => write!(f, "Suspicious User-Agent: {}", ua),
            RejectReason::Path(path) => write!(f, "Suspicious path access: {}", path),
        }
    }
}

/// Outcome of screening a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Allow,
    Reject(RejectReason),
}

/// Percent-decode a raw request path. Invalid UTF-8 is replaced, not dropped.
pub fn decode_path(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

/// Screen a request. The user-agent is checked before the path and the
/// first match wins.
pub fn classify(user_agent: &str, path: &str) -> Classification {
    let user_agent = user_agent.to_lowercase();
    if BLOCKED_USER_AGENTS.iter().any(|p| user_agent.contains(p)) {
        return Classification::Reject(RejectReason::UserAgent(user_agent));
    }

    let path = path.to_lowercase();
    if !path.starts_with(ADMIN_PREFIX) && BLOCKED_PATHS.iter().any(|p| path.contains(p)) {
        return Classification::Reject(RejectReason::Path(path));
    }

    Classification::Allow
}

/// Audit record written for every rejected request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuspiciousEvent {
    pub client_id: String,
    pub reason: String,
    /// Unix time in seconds
    pub timestamp: f64,
    pub user_agent: String,
    pub path: String,
}

impl SuspiciousEvent {
    pub fn cache_key(&self) -> String {
        format_cache_key("suspicious", &format!("{}_{}", self.client_id, self.timestamp))
    }
}

/// Classifier that also records an audit trail
pub struct SuspiciousActivityDetector {
    cache: Arc<dyn Cache>,
}

impl SuspiciousActivityDetector {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    /// Classify a request and record an audit event on rejection.
    ///
    /// A failed or stalled audit write is logged and does not change the
    /// outcome.
    pub async fn inspect(&self, client_id: &str, user_agent: &str, path: &str) -> Classification {
        let classification = classify(user_agent, path);

        if let Classification::Reject(reason) = &classification {
            warn!("Blocked request from {}: {}", client_id, reason);
            increment_counter!("portfolio_requests_blocked_total", "reason" => reason.kind());

            let event = SuspiciousEvent {
                client_id: client_id.to_string(),
                reason: reason.to_string(),
                timestamp: get_current_timestamp(),
                user_agent: user_agent.to_string(),
                path: path.to_string(),
            };
            match tokio::time::timeout(AUDIT_WRITE_TIMEOUT, self.record(&event)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Failed to record suspicious activity for {}: {}", client_id, e);
                    increment_counter!("portfolio_audit_write_failures_total");
                }
                Err(_) => {
                    error!("Timed out recording suspicious activity for {}", client_id);
                    increment_counter!("portfolio_audit_write_failures_total");
                }
            }
        }

        classification
    }

    async fn record(&self, event: &SuspiciousEvent) -> Result<(), CacheError> {
        let value = serde_json::to_string(event)?;
        self.cache.set(&event.cache_key(), &value, AUDIT_TTL_SECONDS).await
    }
}
