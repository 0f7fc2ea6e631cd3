//! Client identification for rate limiting and audit records.
//!
//! The identifier is the leftmost `X-Forwarded-For` entry when present,
//! otherwise the peer address. Clients can forge the header, so a
//! trusted-proxy list may be configured to only honour it when the request
//! arrives through a known proxy.

use std::net::{AddrParseError, IpAddr};

/// Returned when neither the header nor the peer address identify the client
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Derives client identifiers from request metadata
#[derive(Debug, Clone, Default)]
pub struct ClientIdentity {
    /// `None` trusts any forwarded-for header
    trusted_proxies: Option<Vec<IpAddr>>,
}

impl ClientIdentity {
    /// Trust the forwarded-for header from any peer
    pub fn trust_all() -> Self {
        Self::default()
    }

    /// Only honour the forwarded-for header when the peer is one of `proxies`
    pub fn with_trusted_proxies(proxies: Vec<IpAddr>) -> Self {
        Self {
            trusted_proxies: Some(proxies),
        }
    }

    /// Build from configured proxy addresses
    pub fn from_config(proxies: Option<&[String]>) -> Result<Self, AddrParseError> {
        match proxies {
            None => Ok(Self::trust_all()),
            Some(list) => {
                let parsed = list
                    .iter()
                    .map(|p| p.trim().parse::<IpAddr>())
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::with_trusted_proxies(parsed))
            }
        }
    }

    /// Resolve the client identifier
    ///
    /// # Arguments
    ///
    /// * `forwarded_for` - Raw `X-Forwarded-For` header value, if any
    /// * `peer` - Transport-level peer address, if known
    pub fn client_id(&self, forwarded_for: Option<&str>, peer: Option<IpAddr>) -> String {
        let forwarded_for = forwarded_for.filter(|v| !v.trim().is_empty());

        match (&self.trusted_proxies, forwarded_for) {
            (None, Some(header)) => header
                .split(',')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string(),
            (Some(trusted), Some(header)) if peer.map_or(false, |p| trusted.contains(&p)) => {
                Self::first_untrusted_hop(trusted, header)
            }
            _ => peer
                .map(|p| p.to_string())
                .unwrap_or_else(|| UNKNOWN_CLIENT.to_string()),
        }
    }

    /// Walk the chain right to left, skipping trusted proxies
    fn first_untrusted_hop(trusted: &[IpAddr], header: &str) -> String {
        let hops: Vec<&str> = header.split(',').map(str::trim).collect();
        hops.iter()
            .rev()
            .find(|hop| match hop.parse::<IpAddr>() {
                Ok(ip) => !trusted.contains(&ip),
                Err(_) => true,
            })
            .or_else(|| hops.first())
            .map(|hop| hop.to_string())
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
    }
}
