//! Size accounting and least-recently-used eviction
//!
//! Both scans walk the whole tree on every step. These functions block, so
//! async callers run them through `spawn_blocking`.

use crate::error::{CacheError, Result};
use crate::store::is_tmp_name;
use crate::types::EvictionReport;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Committed entry count and byte total of a directory tree.
///
/// Bytes include in-flight temporary files; the count does not.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeSummary {
    pub files: usize,
    pub bytes: u64,
}

/// Oldest file found by [`find_least_recently_used`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LruCandidate {
    pub path: PathBuf,
    pub accessed: SystemTime,
    pub size: u64,
}

/// Depth-first walk over regular files in listing order.
///
/// Symlinks are not followed, so the walk is bounded by the real tree.
/// Entries that disappear mid-walk are skipped.
fn walk_files(
    dir: &Path,
    mut visit: impl FnMut(PathBuf, std::fs::Metadata),
) -> io::Result<()> {
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if is_not_found(&e) => continue,
            Err(e) => return Err(e.into()),
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) if is_not_found(&e) => continue,
            Err(e) => return Err(e.into()),
        };
        visit(entry.into_path(), metadata);
    }
    Ok(())
}

fn is_not_found(err: &walkdir::Error) -> bool {
    err.io_error()
        .map(|e| e.kind() == ErrorKind::NotFound)
        .unwrap_or(false)
}

pub fn scan(dir: &Path) -> io::Result<TreeSummary> {
    let mut summary = TreeSummary::default();
    walk_files(dir, |path, metadata| {
        let in_flight = path
            .file_name()
            .map(|name| is_tmp_name(&name.to_string_lossy()))
            .unwrap_or(false);
        if !in_flight {
            summary.files += 1;
        }
        summary.bytes += metadata.len();
    })?;
    Ok(summary)
}

/// Total bytes of all files under `dir`
pub fn compute_size(dir: &Path) -> io::Result<u64> {
    scan(dir).map(|summary| summary.bytes)
}

/// File with the smallest access time; the first one seen wins ties
pub fn find_least_recently_used(dir: &Path) -> io::Result<Option<LruCandidate>> {
    let mut oldest: Option<LruCandidate> = None;
    let mut failure = None;

    walk_files(dir, |path, metadata| {
        if failure.is_some() {
            return;
        }
        let accessed = match metadata.accessed() {
            Ok(accessed) => accessed,
            Err(e) => {
                failure = Some(e);
                return;
            }
        };
        if oldest.as_ref().map_or(true, |o| accessed < o.accessed) {
            oldest = Some(LruCandidate {
                path,
                accessed,
                size: metadata.len(),
            });
        }
    })?;

    match failure {
        Some(e) => Err(e),
        None => Ok(oldest),
    }
}

/// Delete least-recently-used files until `dir` is under `max_size_bytes`.
///
/// Stops early once no file is left. A file deleted by someone else first is
/// skipped without counting it. Any other failure ends the pass.
pub fn evict(dir: &Path, max_size_bytes: u64) -> Result<EvictionReport> {
    let mut report = EvictionReport::default();

    loop {
        let size = compute_size(dir).map_err(|e| eviction_error("measuring cache size", &e))?;
        report.final_size = size;
        if size < max_size_bytes {
            break;
        }

        let Some(lru) = find_least_recently_used(dir)
            .map_err(|e| eviction_error("finding least recently used entry", &e))?
        else {
            break;
        };

        if remove_entry(&lru.path).map_err(|e| eviction_error("deleting entry", &e))? {
            report.evicted_files += 1;
            report.freed_bytes += lru.size;
        }

        if let Some(parent) = lru.path.parent() {
            if parent != dir && parent.starts_with(dir) {
                if let Err(e) = std::fs::remove_dir(parent) {
                    debug!(path = %parent.display(), error = %e, "Leaf directory kept");
                }
            }
        }

        info!(path = %lru.path.display(), size = lru.size, "Evicted from cache");
    }

    Ok(report)
}

/// Delete one entry file. Returns false if it was already gone.
pub fn remove_entry(path: &Path) -> io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "Entry already evicted");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

fn eviction_error(context: &str, err: &io::Error) -> CacheError {
    CacheError::Eviction(format!("{}: {}", context, err))
}
