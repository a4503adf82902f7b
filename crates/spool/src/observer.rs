//! Server-side view of the requests queue.
//!
//! The observer never reads, moves or deletes request files. Each cycle it
//! counts the immediate entries of the requests root (one directory per
//! device in the standard layout) and the request files one level below, then
//! publishes a [`QueueSnapshot`] on a watch channel.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
pub use tokio_util::sync::CancellationToken;

use crate::error::{Result, SpoolError};
use crate::paths::{QueueKind, ensure_dir};
use crate::wait::MIN_INTERVAL;

pub const DEFAULT_OBSERVE_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ObserverConfig {
    pub requests_root: PathBuf,
    pub interval: Duration,
}

impl ObserverConfig {
    pub fn new(requests_root: impl Into<PathBuf>) -> Self {
        Self {
            requests_root: requests_root.into(),
            interval: DEFAULT_OBSERVE_INTERVAL,
        }
    }

    /// Observe `<root>/Requests`.
    pub fn for_storage_root(root: impl AsRef<Path>) -> Self {
        Self::new(root.as_ref().join(QueueKind::Requests.dir_name()))
    }

    /// Raised to [`MIN_INTERVAL`] if shorter.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_INTERVAL);
        self
    }
}

/// One observation of the requests root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    /// Immediate entries (files and directories) under the requests root.
    pub entries: usize,
    /// `*.json` files inside those entries.
    pub pending: usize,
    pub observed_at: DateTime<Utc>,
}

pub struct QueueObserver {
    config: ObserverConfig,
    status_tx: watch::Sender<Option<QueueSnapshot>>,
}

impl QueueObserver {
    pub fn new(config: ObserverConfig) -> Self {
        let (status_tx, _) = watch::channel(None);
        Self { config, status_tx }
    }

    pub fn config(&self) -> &ObserverConfig {
        &self.config
    }

    /// Latest snapshot; `None` until the first cycle completes. The channel
    /// closes when [`run`](Self::run) returns.
    pub fn subscribe(&self) -> watch::Receiver<Option<QueueSnapshot>> {
        self.status_tx.subscribe()
    }

    pub async fn observe_once(&self) -> Result<QueueSnapshot> {
        let root = &self.config.requests_root;
        ensure_dir(root).await?;

        let mut entries = 0;
        let mut pending = 0;
        let mut dir = tokio::fs::read_dir(root)
            .await
            .map_err(|e| SpoolError::storage(root, e))?;
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| SpoolError::storage(root, e))?
        {
            entries += 1;
            let path = entry.path();
            // Follows symlinked device directories.
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_dir() => pending += count_json_files(&path).await?,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "Skipping unreadable entry")
                }
            }
        }

        Ok(QueueSnapshot {
            entries,
            pending,
            observed_at: Utc::now(),
        })
    }

    /// Observe until `cancel` fires. Returns the last snapshot taken.
    ///
    /// A storage failure on the first cycle is returned as an error; later
    /// failures are logged and the next cycle retries.
    pub async fn run(self, cancel: CancellationToken) -> Result<Option<QueueSnapshot>> {
        let interval = self.config.interval.max(MIN_INTERVAL);
        tracing::info!(
            root = %self.config.requests_root.display(),
            interval_ms = interval.as_millis() as u64,
            "Queue observer started"
        );

        let mut cycle: u64 = 0;
        let mut last = None;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.observe_once().await {
                Ok(snapshot) => {
                    tracing::debug!(
                        cycle,
                        entries = snapshot.entries,
                        pending = snapshot.pending,
                        "Observed requests"
                    );
                    self.status_tx.send_replace(Some(snapshot.clone()));
                    last = Some(snapshot);
                }
                Err(e) if cycle == 0 => return Err(e),
                Err(e) => tracing::warn!(cycle, error = %e, "Observation failed"),
            }
            cycle += 1;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        tracing::info!(
            cycles = cycle,
            entries = last.as_ref().map(|s: &QueueSnapshot| s.entries),
            "Queue observer stopped"
        );
        Ok(last)
    }
}

async fn count_json_files(dir: &Path) -> Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        // Removed between listing and counting.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(SpoolError::storage(dir, e)),
    };

    let mut count = 0;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| SpoolError::storage(dir, e))?
    {
        if entry.path().extension().is_some_and(|ext| ext == "json") {
            count += 1;
        }
    }
    Ok(count)
}
