//! Background eviction task
//!
//! Writes call [`EvictionWorker::trigger`], which never waits. Triggers that
//! arrive while a pass is already queued are merged into it, so at most one
//! pass runs at a time per worker.

use crate::evictor;
use crate::types::EvictionReport;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub struct EvictionWorker {
    trigger_tx: mpsc::Sender<()>,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
    evictions: Arc<AtomicU64>,
}

impl EvictionWorker {
    /// Start the worker on the current tokio runtime
    pub fn spawn(cache_dir: PathBuf, max_size_bytes: u64) -> Self {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let evictions = Arc::new(AtomicU64::new(0));

        let handle = tokio::spawn(run(
            cache_dir,
            max_size_bytes,
            trigger_rx,
            cancel.clone(),
            evictions.clone(),
        ));

        Self {
            trigger_tx,
            cancel,
            handle: Mutex::new(Some(handle)),
            evictions,
        }
    }

    /// Request an eviction pass
    pub fn trigger(&self) {
        match self.trigger_tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => {}
            Err(mpsc::error::TrySendError::Closed(())) => {
                debug!("Eviction worker stopped, trigger ignored");
            }
        }
    }

    /// Files deleted by this worker so far
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Stop accepting triggers and wait for a running pass to finish
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Eviction worker terminated abnormally");
            }
        }
    }
}

impl Drop for EvictionWorker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    cache_dir: PathBuf,
    max_size_bytes: u64,
    mut trigger_rx: mpsc::Receiver<()>,
    cancel: CancellationToken,
    evictions: Arc<AtomicU64>,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = trigger_rx.recv() => {
                if msg.is_none() {
                    break;
                }
                if let Some(report) = run_pass(cache_dir.clone(), max_size_bytes).await {
                    evictions.fetch_add(report.evicted_files as u64, Ordering::Relaxed);
                }
            }
        }
    }
    debug!("Eviction worker stopped");
}

/// One eviction pass on the blocking pool. Failures are logged, never returned.
async fn run_pass(cache_dir: PathBuf, max_size_bytes: u64) -> Option<EvictionReport> {
    let result =
        tokio::task::spawn_blocking(move || evictor::evict(&cache_dir, max_size_bytes)).await;

    match result {
        Ok(Ok(report)) => {
            if report.evicted_files > 0 {
                info!(
                    evicted = report.evicted_files,
                    freed_bytes = report.freed_bytes,
                    size = report.final_size,
                    "Eviction pass finished"
                );
            }
            Some(report)
        }
        Ok(Err(e)) => {
            error!(error = %e, "Eviction pass failed");
            None
        }
        Err(e) => {
            error!(error = %e, "Eviction task panicked");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition()
    }

    #[tokio::test]
    async fn test_trigger_runs_eviction() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a/b/h1/f");
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, b"0123456789").unwrap();

        let worker = EvictionWorker::spawn(dir.path().to_path_buf(), 5);
        worker.trigger();
        worker.trigger();

        assert!(wait_for(|| !file.exists()).await);
        assert!(wait_for(|| worker.evictions() == 1).await);

        worker.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_worker() {
        let dir = tempdir().unwrap();
        let worker = EvictionWorker::spawn(dir.path().to_path_buf(), 5);

        worker.shutdown().await;
        // Second shutdown is a no-op
        worker.shutdown().await;

        let file = dir.path().join("a/b/h1/f");
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, b"0123456789").unwrap();

        worker.trigger();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(file.exists());
    }

    #[tokio::test]
    async fn test_worker_survives_missing_cache_dir() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("cache");

        let worker = EvictionWorker::spawn(root.clone(), 5);
        worker.trigger();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let file = root.join("a/b/h1/f");
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, b"0123456789").unwrap();
        worker.trigger();

        assert!(wait_for(|| !file.exists()).await);
        worker.shutdown().await;
    }
}
