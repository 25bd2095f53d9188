//! Terminal progress reporting (component I, supplement).
//!
//! Grounded on `progress.go`'s `ProgressStats`/`startProgressReporter`. This is
//! purely observational: the scheduler updates the counters and samples them once
//! per tick, but nothing here ever feeds back into termination or crawl decisions.
//! Not part of the crawler core's public API — only the CLI binary wires it up.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Snapshot-friendly counters updated by the scheduler as the crawl progresses.
#[derive(Debug)]
pub struct ProgressStats {
    started_at: Instant,
    queued: AtomicU64,
    processed: AtomicU64,
    stored: AtomicU64,
    errors: AtomicU64,
}

impl Default for ProgressStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressStats {
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            queued: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            stored: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    pub fn set_queued(&self, n: u64) {
        self.queued.store(n, Ordering::Relaxed);
    }

    pub fn increment_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_stored(&self, n: u64) {
        self.stored.store(n, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            elapsed: self.started_at.elapsed(),
            queued: self.queued.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time read of [`ProgressStats`], cheap to copy and render.
#[derive(Debug, Clone, Copy)]
pub struct ProgressSnapshot {
    pub elapsed: Duration,
    pub queued: u64,
    pub processed: u64,
    pub stored: u64,
    pub errors: u64,
}

impl ProgressSnapshot {
    /// A single-line human-readable summary, e.g. for a terminal progress line.
    #[must_use]
    pub fn render_line(&self) -> String {
        format!(
            "[{:>5}s] queued={} processed={} stored={} errors={}",
            self.elapsed.as_secs(),
            self.queued,
            self.processed,
            self.stored,
            self.errors,
        )
    }
}

/// Spawns a background task that renders `stats` to stderr once per `interval`
/// until `cancel` fires. No-op (never spawned) when the caller has `--quiet` set.
pub fn spawn_reporter(
    stats: std::sync::Arc<ProgressStats>,
    interval: Duration,
    mut cancel: tokio::sync::watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    eprintln!("{}", stats.snapshot().render_line());
                }
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        break;
                    }
                }
            }
        }
    })
}
