//! Process-wide ingest counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

/// Counters maintained by the ingest pipeline. Owned by the application
/// root and shared into the ingestor; never a module-level singleton.
#[derive(Default)]
pub struct IngestStats {
    received: AtomicU64,
    broadcast: AtomicU64,
    matched: AtomicU64,
}

impl IngestStats {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broadcast(&self, delivered: u64) {
        self.broadcast.fetch_add(delivered, Ordering::Relaxed);
    }

    pub fn record_matched(&self, fills: u64) {
        self.matched.fetch_add(fills, Ordering::Relaxed);
    }

    #[must_use]
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn broadcast(&self) -> u64 {
        self.broadcast.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn matched(&self) -> u64 {
        self.matched.load(Ordering::Relaxed)
    }

    /// Periodic throughput report.
    pub fn spawn_reporter(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let stats = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            let mut last = stats.received();
            loop {
                ticker.tick().await;
                let total = stats.received();
                let delta = total - last;
                last = total;
                info!(
                    total,
                    rate = delta as f64 / interval.as_secs_f64(),
                    broadcast = stats.broadcast(),
                    matched = stats.matched(),
                    "ingest throughput"
                );
            }
        })
    }
}
