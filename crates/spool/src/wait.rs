//! Waiting for a file to appear.
//!
//! Both strategies re-check the path on a fixed interval until a deadline.
//! [`WaitStrategy::Watch`] additionally subscribes to filesystem events on the
//! parent directory and re-checks early when something changes there. Events
//! are only wake-up hints: a missed or coalesced event costs at most one
//! interval.

use std::path::Path;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::Result;
use crate::paths::ensure_dir;
use crate::store::exists;

/// Shortest interval between checks. Shorter requests are raised to this.
pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WaitStrategy {
    /// Re-check every interval.
    #[default]
    Poll,
    /// Re-check every interval or on a filesystem event, whichever is first.
    Watch,
}

/// Result of waiting on a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    Present { checks: u32 },
    Absent { checks: u32 },
}

impl Arrival {
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present { .. })
    }
}

/// Wait until `path` exists or `timeout` elapses.
///
/// The path is checked immediately, then after every `interval` (at least
/// [`MIN_INTERVAL`]). A final check happens at the deadline.
pub async fn wait_for_file(
    path: &Path,
    strategy: WaitStrategy,
    interval: Duration,
    timeout: Duration,
) -> Result<Arrival> {
    let deadline = Instant::now() + timeout;
    let interval = interval.max(MIN_INTERVAL);

    let mut watch = match (strategy, path.parent()) {
        (WaitStrategy::Watch, Some(dir)) => {
            ensure_dir(dir).await?;
            Some(DirWatch::new(dir)?)
        }
        _ => None,
    };

    let mut checks = 0;
    loop {
        checks += 1;
        if exists(path).await? {
            return Ok(Arrival::Present { checks });
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(Arrival::Absent { checks });
        }

        let next = (now + interval).min(deadline);
        tracing::trace!(path = %path.display(), checks, "Not there yet");

        match watch.as_mut() {
            Some(watch) => {
                tokio::select! {
                    _ = watch.changed() => {}
                    _ = tokio::time::sleep_until(next) => {}
                }
            }
            None => tokio::time::sleep_until(next).await,
        }
    }
}

/// Non-recursive watch on one directory, forwarded into the runtime.
struct DirWatch {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<()>,
}

impl DirWatch {
    fn new(dir: &Path) -> Result<Self> {
        let (tx, rx) = mpsc::channel(16);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                        // Full channel means a wake-up is already queued.
                        let _ = tx.try_send(());
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Filesystem watch error"),
            },
            notify::Config::default(),
        )?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        tracing::debug!(dir = %dir.display(), "Watching for responses");
        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    async fn changed(&mut self) {
        if self.rx.recv().await.is_none() {
            // Watcher thread is gone; fall back to interval re-checks.
            std::future::pending::<()>().await;
        }
    }
}
