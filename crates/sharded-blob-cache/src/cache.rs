//! The cache stage of a request: serve from disk or fetch and store

use crate::error::Result;
use crate::evictor;
use crate::fetcher::Fetcher;
use crate::store::AssetStore;
use crate::types::{
    AssetRecord, AssetRequest, CacheConfig, CacheStats, CachedAsset, EvictionReport,
};
use crate::worker::EvictionWorker;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, Weak};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

type KeyLocks = std::sync::Mutex<HashMap<String, Weak<Mutex<()>>>>;

/// Disk cache in front of a [`Fetcher`]
pub struct AssetCache {
    config: CacheConfig,
    store: AssetStore,
    fetcher: Arc<dyn Fetcher>,
    worker: EvictionWorker,
    /// One async lock per content hash with a request in flight
    key_locks: KeyLocks,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AssetCache {
    /// Create a cache and start its eviction worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: CacheConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        let store = AssetStore::new(config.cache_dir.clone());
        let worker = EvictionWorker::spawn(config.cache_dir.clone(), config.max_size_bytes);
        Self {
            config,
            store,
            fetcher,
            worker,
            key_locks: std::sync::Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub async fn init(&self) -> Result<()> {
        self.store.init().await
    }

    pub fn store(&self) -> &AssetStore {
        &self.store
    }

    /// Return the cached asset for `request`, fetching and storing it on a miss.
    ///
    /// Hits never wait on other requests. Concurrent misses for the same key
    /// are serialized, so a key is fetched at most once at a time by this
    /// process.
    pub async fn get_or_fetch(&self, request: &AssetRequest) -> Result<CachedAsset> {
        let key = request.effective_key();
        let shard = self.store.shard_path(key);

        if let Some(hit) = self.lookup(key).await? {
            return Ok(hit);
        }

        // Misses on the same key queue here; whoever waited re-checks the disk
        let lock = self.key_lock(&shard.content_hash);
        let _guard = lock.lock().await;

        if let Some(hit) = self.lookup(key).await? {
            return Ok(hit);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, url = %request.fetch_url, "Cache miss");

        match self.fetch_and_store(key, &request.fetch_url).await {
            Ok(record) => {
                self.worker.trigger();
                Ok(CachedAsset {
                    record,
                    from_cache: false,
                })
            }
            Err(e) => {
                error!(
                    path = %shard.leaf_path.display(),
                    error = %e,
                    "Caching asset failed"
                );
                Err(e)
            }
        }
    }

    async fn lookup(&self, key: &str) -> Result<Option<CachedAsset>> {
        let Some(record) = self.store.get(key).await? else {
            return Ok(None);
        };
        self.hits.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "Cache hit");
        Ok(Some(CachedAsset {
            record,
            from_cache: true,
        }))
    }

    async fn fetch_and_store(&self, key: &str, url: &str) -> Result<AssetRecord> {
        let fetched = self.fetcher.fetch(url, &self.config.fetch_options).await?;
        let record = AssetRecord::from(fetched);
        self.store.put(key, &record).await?;
        Ok(record)
    }

    fn key_lock(&self, content_hash: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .key_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, lock| lock.strong_count() > 0);

        if let Some(lock) = locks.get(content_hash).and_then(Weak::upgrade) {
            return lock;
        }
        let lock = Arc::new(Mutex::new(()));
        locks.insert(content_hash.to_string(), Arc::downgrade(&lock));
        lock
    }

    /// Run an eviction pass now and wait for it
    pub async fn evict_now(&self) -> Result<EvictionReport> {
        let cache_dir = self.config.cache_dir.clone();
        let max_size_bytes = self.config.max_size_bytes;
        tokio::task::spawn_blocking(move || evictor::evict(&cache_dir, max_size_bytes)).await?
    }

    /// Get current cache statistics
    pub async fn stats(&self) -> CacheStats {
        let cache_dir = self.config.cache_dir.clone();
        let summary = match tokio::task::spawn_blocking(move || evictor::scan(&cache_dir)).await {
            Ok(Ok(summary)) => summary,
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to scan cache directory");
                Default::default()
            }
            Err(e) => {
                warn!(error = %e, "Cache scan task failed");
                Default::default()
            }
        };

        CacheStats {
            entries: summary.files,
            total_size: summary.bytes,
            max_size: self.config.max_size_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.worker.evictions(),
        }
    }

    /// Stop the eviction worker
    pub async fn shutdown(&self) {
        self.worker.shutdown().await;
    }
}
