//! Asset Cache Proxy - fetches remote assets once and serves them from disk
//!
//! Assets are stored in a hash-sharded directory tree and evicted least
//! recently used first once the tree grows past its size budget.

mod error;
mod server;
mod types;

use crate::error::{ProxyError, Result};
use crate::server::{start_server, ServerState, SharedState};
use crate::types::ProxyConfig;
use sharded_blob_cache::{AssetCache, HttpFetcher};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("asset_cache_proxy=info".parse()?)
        .add_directive("sharded_blob_cache=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting Asset Cache Proxy...");

    let config = load_config()?;
    info!("Port: {}", config.port);
    info!("Cache dir: {:?}", config.cache_dir);
    info!(
        "Max cache size: {} MB",
        config.max_cache_size / (1024 * 1024)
    );

    let cache = AssetCache::new(config.cache_config(), Arc::new(HttpFetcher::new()));
    cache.init().await?;

    let state: SharedState = Arc::new(ServerState::new(cache));

    start_server(state.clone(), config.port, shutdown_signal())
        .await
        .map_err(|e| ProxyError::Config(format!("Server error: {}", e)))?;

    info!("Shutting down eviction worker");
    state.cache.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn load_config() -> Result<ProxyConfig> {
    let defaults = ProxyConfig::default();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(defaults.port);

    let cache_dir = std::env::var("CACHE_DIR")
        .map(PathBuf::from)
        .unwrap_or(defaults.cache_dir);

    let max_cache_size = match std::env::var("MAX_CACHE_SIZE") {
        Ok(s) => s.parse::<u64>().map_err(|_| {
            ProxyError::Config(format!("MAX_CACHE_SIZE must be a byte count, got {:?}", s))
        })?,
        Err(_) => defaults.max_cache_size,
    };

    Ok(ProxyConfig {
        port,
        cache_dir,
        max_cache_size,
    })
}
