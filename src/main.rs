//! Portfolio Shield
//!
//! This is the main entry point for the portfolio shield service.
//! It initializes the protection chain and starts the web server.

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use log::{info, warn};
use metrics_exporter_prometheus::PrometheusBuilder;

use portfolio_shield::api::{self, ContactRateLimit, SecurityHeaders, SuspiciousActivity};
use portfolio_shield::config;
use portfolio_shield::core::{
    Cache, ClientIdentity, MemoryCache, RateLimiter, RedisCache, SuspiciousActivityDetector,
};
use portfolio_shield::models::CacheBackend;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    env_logger::init();

    info!("Starting portfolio shield...");

    let config = config::load_config().context("Failed to load configuration")?;

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install metrics recorder")?;

    let cache: Arc<dyn Cache> = match config.cache.backend {
        CacheBackend::Redis => Arc::new(
            RedisCache::connect(&config.cache.redis_url)
                .await
                .context("Failed to connect to Redis")?,
        ),
        CacheBackend::Memory => {
            warn!("Using in-memory cache; counters are not shared between instances");
            Arc::new(MemoryCache::new())
        }
    };

    let identity = ClientIdentity::from_config(config.proxy.trusted_proxies.as_deref())
        .context("Invalid trusted proxy address")?;
    if config.proxy.trusted_proxies.is_none() {
        warn!("No trusted proxies configured; X-Forwarded-For is trusted from any client");
    }

    let detector = Arc::new(SuspiciousActivityDetector::new(cache.clone()));
    let limiter = Arc::new(RateLimiter::new(cache));
    let origin_root = config.origin_root().map(str::to_string);
    let metrics = web::Data::new(metrics);

    info!("Listening on {}:{}", config.server.host, config.server.port);

    HttpServer::new(move || {
        App::new()
            .app_data(metrics.clone())
            .wrap(ContactRateLimit::new(limiter.clone(), identity.clone()))
            .wrap(SuspiciousActivity::new(detector.clone(), identity.clone()))
            .wrap(SecurityHeaders)
            .configure(|cfg| api::config(cfg, origin_root.as_deref()))
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await?;

    Ok(())
}
