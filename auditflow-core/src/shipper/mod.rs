//! Shipper: batches unique events and delivers them to the log sink
//!
//! The shipper flushes when the batch size is reached or when the flush
//! interval elapses with events buffered. A batch that still fails after the
//! sink's own retries is dropped and counted; nothing is reported upstream.

mod client;

pub use client::{EventSink, SplunkClient};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::ShipperConfig;
use crate::error::Result;

/// Shipping statistics
#[derive(Debug, Default)]
pub struct ShipStats {
    events_sent: AtomicU64,
    batches_sent: AtomicU64,
    events_dropped: AtomicU64,
}

impl ShipStats {
    pub fn events_sent(&self) -> u64 {
        self.events_sent.load(Ordering::Relaxed)
    }

    pub fn batches_sent(&self) -> u64 {
        self.batches_sent.load(Ordering::Relaxed)
    }

    pub fn events_dropped(&self) -> u64 {
        self.events_dropped.load(Ordering::Relaxed)
    }
}

/// Buffers payloads and hands them to an [`EventSink`] in batches
pub struct Shipper<K> {
    sink: K,
    buffer: Vec<Vec<u8>>,
    batch_size: usize,
    flush_interval: Duration,
    stats: Arc<ShipStats>,
}

impl<K: EventSink> Shipper<K> {
    pub fn new(sink: K, batch_size: usize, flush_interval: Duration) -> Self {
        Self {
            sink,
            buffer: Vec::new(),
            batch_size: batch_size.max(1),
            flush_interval,
            stats: Arc::new(ShipStats::default()),
        }
    }

    pub fn from_config(sink: K, config: &ShipperConfig) -> Self {
        Self::new(sink, config.batch_size, config.flush_interval())
    }

    pub fn stats(&self) -> Arc<ShipStats> {
        Arc::clone(&self.stats)
    }

    /// Deliver everything buffered and return how many events went through
    pub async fn flush(&mut self) -> usize {
        if self.buffer.is_empty() {
            return 0;
        }

        let batch: Vec<Vec<u8>> = self.buffer.drain(..).collect();
        let count = batch.len();

        match self.sink.deliver(&batch).await {
            Ok(()) => {
                self.stats.events_sent.fetch_add(count as u64, Ordering::Relaxed);
                self.stats.batches_sent.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(events = count, "Shipped batch");
                count
            }
            Err(e) => {
                self.stats.events_dropped.fetch_add(count as u64, Ordering::Relaxed);
                tracing::warn!(events = count, error = %e, "Failed to ship batch, dropping it");
                0
            }
        }
    }

    /// Ship until `source` closes, then flush what is left.
    pub async fn run(mut self, mut source: mpsc::Receiver<Vec<u8>>) -> Result<()> {
        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(batch_size = self.batch_size, "Shipper started");

        loop {
            tokio::select! {
                received = source.recv() => match received {
                    Some(payload) => {
                        self.buffer.push(payload);
                        if self.buffer.len() >= self.batch_size {
                            self.flush().await;
                        }
                    }
                    None => {
                        self.flush().await;
                        tracing::info!(
                            sent = self.stats.events_sent(),
                            dropped = self.stats.events_dropped(),
                            "Shipper input closed"
                        );
                        return Ok(());
                    }
                },
                _ = ticker.tick() => {
                    self.flush().await;
                }
            }
        }
    }
}
