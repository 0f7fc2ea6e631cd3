use serde::{Deserialize, Serialize};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
}

/// Where rate counters and audit records are kept
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Redis,
    Memory,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache backend
    pub backend: CacheBackend,
    /// Redis connection URL
    pub redis_url: String,
}

/// Proxy trust configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Proxies allowed to set X-Forwarded-For. Unset trusts every client.
    #[serde(default)]
    pub trusted_proxies: Option<Vec<String>>,
}

/// Optional request checks
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Canonical site root, e.g. `https://example.com`
    #[serde(default)]
    pub site_root: Option<String>,
    /// Require same-origin contact form submissions
    #[serde(default)]
    pub enforce_same_origin: bool,
}

/// Application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Cache configuration
    pub cache: CacheConfig,
    /// Proxy trust configuration
    #[serde(default)]
    pub proxy: ProxyConfig,
    /// Optional request checks
    #[serde(default)]
    pub security: SecurityConfig,
}

impl Config {
    /// Site root to enforce on contact submissions, if enabled
    pub fn origin_root(&self) -> Option<&str> {
        if self.security.enforce_same_origin {
            self.security.site_root.as_deref()
        } else {
            None
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            cache: CacheConfig {
                backend: CacheBackend::Redis,
                redis_url: "redis://127.0.0.1:6379".to_string(),
            },
            proxy: ProxyConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

/// Contact form submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactForm {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}
