//! Disk-backed asset cache with a hash-sharded layout and LRU eviction
//!
//! Each asset lives at
//! `<cache_dir>/<bucket1>/<bucket2>/<sha256(key)>/<base64("<type>:<length>")>`.
//! The file name is the only metadata; there is no side index. Total disk
//! usage is bounded by deleting the least recently accessed files.

pub mod cache;
pub mod error;
pub mod evictor;
pub mod fetcher;
pub mod name_codec;
pub mod shard;
pub mod store;
pub mod types;
pub mod worker;

pub use cache::AssetCache;
pub use error::{CacheError, Result};
pub use fetcher::{Fetcher, HttpFetcher};
pub use shard::{compute_shard_path, ShardPath};
pub use store::{touch, AssetStore};
pub use types::{
    AssetRecord, AssetRequest, CacheConfig, CacheStats, CachedAsset, EvictionReport,
    FetchOptions, FetchedAsset,
};
pub use worker::EvictionWorker;
