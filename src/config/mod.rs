//! Configuration management for the portfolio shield.
//!
//! Settings come from an optional TOML file and `PORTFOLIO__*` environment
//! variables, layered over built-in defaults.

use std::env;

use config::{Config as ConfigBuilder, ConfigError, Environment, File};

use crate::models::Config;

/// Load configuration from the config file and environment variables
pub fn load_config() -> Result<Config, ConfigError> {
    let config_file = env::var("CONFIG_FILE").unwrap_or_else(|_| "config/default.toml".to_string());
    build_config(Some(&config_file))
}

fn build_config(config_file: Option<&str>) -> Result<Config, ConfigError> {
    let mut builder = ConfigBuilder::builder()
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 8080)?
        .set_default("cache.backend", "redis")?
        .set_default("cache.redis_url", "redis://127.0.0.1:6379")?
        .set_default("security.enforce_same_origin", false)?;

    if let Some(path) = config_file {
        builder = builder.add_source(File::with_name(path).required(false));
    }

    builder
        .add_source(
            Environment::with_prefix("PORTFOLIO")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("proxy.trusted_proxies")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CacheBackend;

    #[test]
    fn test_defaults_without_file() {
        let config = build_config(None).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.cache.backend, CacheBackend::Redis);
        assert!(config.proxy.trusted_proxies.is_none());
        assert!(config.origin_root().is_none());
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        assert!(build_config(Some("does/not/exist.toml")).is_ok());
    }
}
