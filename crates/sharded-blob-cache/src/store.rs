//! Reads and writes entries in the sharded layout
//!
//! A leaf directory holds at most one committed entry. Payloads are written
//! to a dot-prefixed temporary file in the same leaf and renamed into place,
//! so a reader never sees a truncated entry under its real name.

use crate::error::{CacheError, Result};
use crate::name_codec;
use crate::shard::{compute_shard_path, ShardPath};
use crate::types::AssetRecord;
use filetime::FileTime;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Disk store for cache entries
#[derive(Debug, Clone)]
pub struct AssetStore {
    cache_dir: PathBuf,
}

impl AssetStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Ensure the cache root exists
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.cache_dir).await?;
        info!(cache_dir = ?self.cache_dir, "Cache initialized");
        Ok(())
    }

    pub fn shard_path(&self, cache_key: &str) -> ShardPath {
        compute_shard_path(&self.cache_dir, cache_key.as_bytes())
    }

    /// Read the entry for `cache_key` and mark it as recently used.
    ///
    /// Missing, empty, undecodable and concurrently evicted entries are all
    /// reported as a miss.
    pub async fn get(&self, cache_key: &str) -> Result<Option<AssetRecord>> {
        let started = Instant::now();
        let leaf = self.shard_path(cache_key).leaf_path;

        let Some((path, name)) = first_entry(&leaf).await? else {
            if fs::try_exists(&leaf).await.unwrap_or(false) {
                warn!(path = %leaf.display(), "Empty leaf directory, treating as miss");
                remove_dir_if_empty(&leaf).await;
            }
            return Ok(None);
        };

        let (content_type, content_length) = match name_codec::decode(&name) {
            Ok(meta) => meta,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Discarding undecodable entry");
                remove_file_if_exists(&path).await?;
                remove_dir_if_empty(&leaf).await;
                return Ok(None);
            }
        };

        let payload = match fs::read(&path).await {
            Ok(payload) => payload,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "Entry vanished before read");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        touch(&path).await;

        info!(
            path = %path.display(),
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "Read buffer from cache"
        );

        Ok(Some(AssetRecord {
            content_type,
            content_length,
            payload,
        }))
    }

    /// Write `record` as the single current entry for `cache_key`.
    ///
    /// Returns the path of the committed file. On failure nothing is left
    /// under the entry name and the temporary file is removed.
    pub async fn put(&self, cache_key: &str, record: &AssetRecord) -> Result<PathBuf> {
        let started = Instant::now();
        let name = name_codec::encode(&record.content_type, record.content_length);
        if !name_codec::is_valid_file_name(&name) {
            return Err(CacheError::InvalidContentType(record.content_type.clone()));
        }

        let leaf = self.shard_path(cache_key).leaf_path;
        fs::create_dir_all(&leaf).await?;

        let final_path = leaf.join(&name);
        let tmp_path = leaf.join(tmp_file_name());

        if let Err(e) = write_and_commit(&leaf, &tmp_path, &final_path, &record.payload).await {
            remove_file_if_exists(&tmp_path).await.ok();
            error!(
                path = %final_path.display(),
                error = %e,
                "Caching asset failed"
            );
            return Err(e);
        }

        remove_stale_entries(&leaf, &name).await?;

        info!(
            path = %final_path.display(),
            size = record.payload.len(),
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "Wrote buffer to cache"
        );

        Ok(final_path)
    }

    /// Drop the entry for `cache_key`. Returns false if there was none.
    pub async fn remove(&self, cache_key: &str) -> Result<bool> {
        let leaf = self.shard_path(cache_key).leaf_path;
        match fs::remove_dir_all(&leaf).await {
            Ok(()) => {
                debug!(path = %leaf.display(), "Removed cache entry");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Set access and modification time of `path` to now.
///
/// A missing file is logged and skipped; this never creates a file.
pub async fn touch(path: &Path) {
    let target = path.to_path_buf();
    let result = tokio::task::spawn_blocking(move || {
        let now = FileTime::now();
        filetime::set_file_times(&target, now, now)
    })
    .await;

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(path = %path.display(), error = %e, "Failed to update access time")
        }
        Err(e) => warn!(path = %path.display(), error = %e, "Touch task failed"),
    }
}

fn tmp_file_name() -> String {
    format!(
        ".tmp-{}-{}",
        std::process::id(),
        TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

/// In-flight writes use dot-prefixed names inside the leaf
pub(crate) fn is_tmp_name(name: &str) -> bool {
    name.starts_with('.')
}

async fn write_and_commit(
    leaf: &Path,
    tmp_path: &Path,
    final_path: &Path,
    payload: &[u8],
) -> Result<()> {
    // An empty leaf can be removed by a concurrent reader or eviction pass
    // between its creation and this write
    let mut file = match fs::File::create(tmp_path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            fs::create_dir_all(leaf).await?;
            fs::File::create(tmp_path).await?
        }
        Err(e) => return Err(e.into()),
    };
    file.write_all(payload).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(tmp_path, final_path).await?;
    Ok(())
}

/// First committed regular file in listing order
async fn first_entry(leaf: &Path) -> Result<Option<(PathBuf, String)>> {
    let mut dir = match fs::read_dir(leaf).await {
        Ok(dir) => dir,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_tmp_name(&name) {
            continue;
        }
        match entry.file_type().await {
            Ok(file_type) if file_type.is_file() => return Ok(Some((entry.path(), name))),
            Ok(_) => continue,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(None)
}

async fn remove_stale_entries(leaf: &Path, current: &str) -> Result<()> {
    let mut dir = fs::read_dir(leaf).await?;
    while let Some(entry) = dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == current || is_tmp_name(&name) {
            continue;
        }
        if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
            debug!(path = %entry.path().display(), "Removing stale entry");
            remove_file_if_exists(&entry.path()).await?;
        }
    }
    Ok(())
}

pub(crate) async fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn remove_dir_if_empty(dir: &Path) {
    if let Err(e) = fs::remove_dir(dir).await {
        debug!(path = %dir.display(), error = %e, "Leaf directory not removed");
    }
}
