//! Core types for the asset cache proxy

use serde::{Deserialize, Serialize};
use sharded_blob_cache::{CacheConfig, CacheStats};
use std::path::PathBuf;

/// Configuration for the proxy
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub port: u16,
    pub cache_dir: PathBuf,
    pub max_cache_size: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        let cache = CacheConfig::default();
        Self {
            port: 3001,
            cache_dir: cache.cache_dir,
            max_cache_size: cache.max_size_bytes,
        }
    }
}

impl ProxyConfig {
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new(self.cache_dir.clone(), self.max_cache_size)
    }
}

/// Query string of `/asset`
#[derive(Debug, Deserialize)]
pub struct AssetQuery {
    pub url: Option<String>,
    pub key: Option<String>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub cache: CacheStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProxyConfig::default();
        assert_eq!(config.port, 3001);
        assert!(config.cache_dir.ends_with("tmp"));
        assert_eq!(config.max_cache_size, 1024 * 1024 * 1024);
    }

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "ok".to_string(),
            uptime_secs: 3600,
            cache: CacheStats {
                entries: 100,
                total_size: 50_000_000,
                max_size: 1 << 30,
                hits: 500,
                misses: 50,
                evictions: 3,
            },
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("3600"));
        assert!(json.contains("50000000"));
    }

    #[test]
    fn test_asset_query_deserialization() {
        let query: AssetQuery =
            serde_json::from_str(r#"{"url": "https://example.org/a.png"}"#).unwrap();
        assert_eq!(query.url.as_deref(), Some("https://example.org/a.png"));
        assert!(query.key.is_none());
    }
}
