//! Same-origin validation.
//!
//! Not part of the mandatory chain. Routes opt in by attaching
//! [`SameOriginGuard`].

use actix_web::guard::{Guard, GuardContext};
use actix_web::http::header;

/// Check that `Origin` and `Referer`, when present, point at `site_root`.
///
/// `site_root` is the scheme and host without a trailing slash, e.g.
/// `https://example.com`. Missing headers pass.
pub fn is_same_origin(origin: Option<&str>, referer: Option<&str>, site_root: &str) -> bool {
    let site_root = site_root.trim_end_matches('/');

    if let Some(origin) = origin {
        if !origin.starts_with(site_root) {
            return false;
        }
    }

    if let Some(referer) = referer {
        if !referer.starts_with(site_root) {
            return false;
        }
    }

    true
}

/// Route guard that only matches same-origin requests
#[derive(Debug, Clone)]
pub struct SameOriginGuard {
    site_root: String,
}

impl SameOriginGuard {
    pub fn new(site_root: impl Into<String>) -> Self {
        Self {
            site_root: site_root.into(),
        }
    }
}

impl Guard for SameOriginGuard {
    fn check(&self, ctx: &GuardContext<'_>) -> bool {
        let headers = &ctx.head().headers;
        let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
        let referer = headers.get(header::REFERER).and_then(|v| v.to_str().ok());
        is_same_origin(origin, referer, &self.site_root)
    }
}
