//! Cache types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default eviction threshold: 1 GiB
pub const DEFAULT_MAX_SIZE_BYTES: u64 = 1024 * 1024 * 1024;

/// Configuration for an [`AssetCache`](crate::AssetCache)
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Root of the sharded storage tree
    pub cache_dir: PathBuf,
    /// Eviction starts once the tree reaches this many bytes
    pub max_size_bytes: u64,
    /// Forwarded verbatim to the fetcher on every miss
    pub fetch_options: FetchOptions,
}

impl CacheConfig {
    pub fn new(cache_dir: impl Into<PathBuf>, max_size_bytes: u64) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            max_size_bytes,
            fetch_options: FetchOptions::default(),
        }
    }

    pub fn with_fetch_options(mut self, fetch_options: FetchOptions) -> Self {
        self.fetch_options = fetch_options;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        let cache_dir = std::env::current_dir()
            .map(|cwd| cwd.join("tmp"))
            .unwrap_or_else(|_| PathBuf::from("tmp"));
        Self::new(cache_dir, DEFAULT_MAX_SIZE_BYTES)
    }
}

/// Options handed to the fetcher unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    pub headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

/// A cached asset: the metadata lives in the entry's file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRecord {
    pub content_type: String,
    pub content_length: u64,
    pub payload: Vec<u8>,
}

impl AssetRecord {
    pub fn new(content_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            content_type: content_type.into(),
            content_length: payload.len() as u64,
            payload,
        }
    }
}

/// What a fetcher hands back on success
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedAsset {
    pub content_type: String,
    pub content_length: u64,
    pub payload: Vec<u8>,
}

impl From<FetchedAsset> for AssetRecord {
    fn from(asset: FetchedAsset) -> Self {
        Self {
            content_type: asset.content_type,
            content_length: asset.content_length,
            payload: asset.payload,
        }
    }
}

/// A request flowing through the cache stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRequest {
    pub cache_key: Option<String>,
    pub fetch_url: String,
}

impl AssetRequest {
    pub fn new(fetch_url: impl Into<String>) -> Self {
        Self {
            cache_key: None,
            fetch_url: fetch_url.into(),
        }
    }

    pub fn with_cache_key(mut self, cache_key: impl Into<String>) -> Self {
        self.cache_key = Some(cache_key.into());
        self
    }

    /// The key used for storage, falling back to the fetch URL
    pub fn effective_key(&self) -> &str {
        self.cache_key.as_deref().unwrap_or(&self.fetch_url)
    }
}

/// Result of the cache stage
#[derive(Debug, Clone)]
pub struct CachedAsset {
    pub record: AssetRecord,
    pub from_cache: bool,
}

/// Summary of one eviction pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionReport {
    pub evicted_files: usize,
    pub freed_bytes: u64,
    pub final_size: u64,
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size: u64,
    pub max_size: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}
