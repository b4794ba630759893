//! Write batching in front of the tick archive.
//!
//! The ingest path must never block on the archive: `push` only appends to a
//! buffer, and full batches are written from a spawned task. A flusher task
//! drains stragglers on a fixed interval. Failed writes are logged and the
//! batch dropped.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::TickArchive;
use crate::core::domain::Ticker;

pub struct TickBatcher {
    archive: Arc<dyn TickArchive>,
    buffer: Mutex<Vec<Ticker>>,
    batch_size: usize,
}

impl TickBatcher {
    #[must_use]
    pub fn new(archive: Arc<dyn TickArchive>, batch_size: usize) -> Arc<Self> {
        Arc::new(Self {
            archive,
            buffer: Mutex::new(Vec::with_capacity(batch_size)),
            batch_size: batch_size.max(1),
        })
    }

    /// Buffer one tick; kicks off a write when the batch is full.
    pub fn push(&self, tick: Ticker) {
        let full = {
            let mut buffer = self.buffer.lock();
            buffer.push(tick);
            (buffer.len() >= self.batch_size).then(|| std::mem::take(&mut *buffer))
        };
        if let Some(batch) = full {
            self.write(batch);
        }
    }

    /// Drain whatever is buffered and write it.
    pub fn flush(&self) {
        let batch = std::mem::take(&mut *self.buffer.lock());
        if !batch.is_empty() {
            self.write(batch);
        }
    }

    /// Number of ticks currently buffered.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.lock().len()
    }

    fn write(&self, batch: Vec<Ticker>) {
        let archive = Arc::clone(&self.archive);
        tokio::spawn(async move {
            match archive.insert_batch(&batch).await {
                Ok(written) => debug!(rows = written, "archived tick batch"),
                // Ingest keeps going; the batch is gone.
                Err(e) => error!(error = %e, rows = batch.len(), "tick archive insert failed, dropping batch"),
            }
        });
    }

    /// Periodic flush so sparse codes still land within `interval`.
    pub fn spawn_flusher(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let batcher = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                batcher.flush();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::archive::MemoryTickArchive;
    use rust_decimal_macros::dec;

    fn tick(ts: i64) -> Ticker {
        serde_json::from_str(&format!(
            r#"{{"code":"KRW-BTC","trade_price":100000000,"timestamp":{ts}}}"#
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn push_writes_once_batch_is_full() {
        let archive = Arc::new(MemoryTickArchive::new());
        let batcher = TickBatcher::new(archive.clone() as Arc<dyn TickArchive>, 3);

        batcher.push(tick(1_000));
        batcher.push(tick(2_000));
        assert_eq!(batcher.buffered(), 2);
        assert!(archive.latest("KRW-BTC").await.unwrap().is_none());

        batcher.push(tick(3_000));
        assert_eq!(batcher.buffered(), 0);
        // The write runs on a spawned task.
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            archive.latest("KRW-BTC").await.unwrap(),
            Some(dec!(100000000))
        );
    }

    #[tokio::test]
    async fn flush_drains_partial_batches() {
        let archive = Arc::new(MemoryTickArchive::new());
        let batcher = TickBatcher::new(archive.clone() as Arc<dyn TickArchive>, 100);

        batcher.push(tick(1_000));
        batcher.flush();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(batcher.buffered(), 0);
        assert!(archive.latest("KRW-BTC").await.unwrap().is_some());
    }
}
