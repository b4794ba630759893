//! Task wiring and graceful shutdown for the long-running process.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::state::App;
use crate::core::archive::TickBatcher;
use crate::core::feed::{Ingestor, IngestorSettings};
use crate::error::Result;

/// Interval for the ingest throughput report.
const STATS_REPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Run the core: ingestor, lifecycle sweeper, batcher flusher, and stats
/// reporter, until a shutdown signal arrives.
pub async fn run(app: App) -> Result<()> {
    let batcher = TickBatcher::new(Arc::clone(&app.archive), app.config.feed.batch_size);
    let flusher = Arc::clone(&batcher)
        .spawn_flusher(Duration::from_millis(app.config.feed.flush_interval_ms));

    let lifecycle = tokio::spawn(Arc::clone(&app.lifecycle).run(Duration::from_secs(
        app.config.lifecycle.sweep_interval_secs,
    )));

    let reporter = Arc::clone(&app.stats).spawn_reporter(STATS_REPORT_INTERVAL);

    let ingestor = Ingestor::new(
        IngestorSettings {
            url: app.config.feed.url.clone(),
            codes: app.config.feed.codes.clone(),
            reconnect_delay: Duration::from_secs(app.config.feed.reconnect_delay_secs),
            ping_interval: Duration::from_secs(app.config.feed.ping_interval_secs),
            idle_timeout: Duration::from_secs(app.config.feed.idle_timeout_secs),
        },
        Arc::clone(&batcher),
        Arc::clone(&app.bus),
        Arc::clone(&app.matching),
        Arc::clone(&app.stats),
    );
    let ingest = tokio::spawn(ingestor.run());

    info!("coinarena core running");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    ingest.abort();
    lifecycle.abort();
    reporter.abort();
    flusher.abort();
    batcher.flush();
    app.bus.clear();
    // The pool closes when App drops.
    info!("coinarena core stopped");
    Ok(())
}
