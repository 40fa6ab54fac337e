//! Incremental audit event collector
//!
//! On every tick the collector scans `/v3/audit_events` newest-first until it
//! reaches the checkpoint (the newest GUID seen by the previous cycle) or an
//! event older than the lookback window. The events in front of that boundary
//! are anonymized, encoded and pushed one by one onto the outbound channel.
//!
//! ## Failure handling
//!
//! A cycle attempt is all-or-nothing: any transport, status or decode failure
//! aborts it, and the whole scan is retried from page one with the unchanged
//! checkpoint. After `max_attempts` failed attempts within one tick the
//! collector returns [`Error::RetriesExhausted`], which the pipeline treats as
//! fatal.

mod checkpoint;
mod client;
mod gather;
mod retry;

pub use checkpoint::{CheckpointStore, MemoryCheckpoint};
pub use client::{first_page_link, AuditEventClient, PageSource};
pub use gather::{gather, Gathered, ScanBounds, StopReason};
pub use retry::{BackoffPolicy, ExponentialBackoff, NoBackoff};

use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::{CloudFoundryConfig, CollectorConfig};
use crate::error::{Error, Result};
use crate::types::AuditEvent;

/// Per-cycle scan and retry limits
#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub first_link: String,
    pub lookback: chrono::Duration,
    pub max_attempts: u32,
    pub max_pages: usize,
}

impl CollectorSettings {
    pub fn from_config(cloud_foundry: &CloudFoundryConfig, collector: &CollectorConfig) -> Self {
        Self {
            first_link: first_page_link(cloud_foundry.per_page),
            lookback: collector.lookback(),
            max_attempts: collector.max_attempts.max(1),
            max_pages: collector.max_pages.max(1),
        }
    }
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self::from_config(&CloudFoundryConfig::default(), &CollectorConfig::default())
    }
}

/// Collection statistics
#[derive(Debug, Default, Clone)]
pub struct CollectorStats {
    /// Successful cycles
    pub cycles: u64,
    /// Failed attempts that were retried or escalated
    pub failed_attempts: u64,
    /// Events pushed downstream
    pub events_emitted: u64,
}

/// Polls the audit event API and feeds anonymized payloads downstream
pub struct EventCollector<S, C = MemoryCheckpoint> {
    source: S,
    checkpoint: C,
    destination: mpsc::Sender<Vec<u8>>,
    settings: CollectorSettings,
    backoff: Box<dyn BackoffPolicy>,
    stats: CollectorStats,
}

impl<S, C> EventCollector<S, C>
where
    S: PageSource,
    C: CheckpointStore,
{
    pub fn new(
        source: S,
        checkpoint: C,
        destination: mpsc::Sender<Vec<u8>>,
        settings: CollectorSettings,
    ) -> Self {
        Self {
            source,
            checkpoint,
            destination,
            settings,
            backoff: Box::new(ExponentialBackoff::default()),
            stats: CollectorStats::default(),
        }
    }

    /// Replace the default exponential backoff
    pub fn with_backoff(mut self, backoff: impl BackoffPolicy + 'static) -> Self {
        self.backoff = Box::new(backoff);
        self
    }

    /// GUID the next cycle will stop at
    pub fn checkpoint(&self) -> Option<String> {
        self.checkpoint.load()
    }

    pub fn stats(&self) -> &CollectorStats {
        &self.stats
    }

    /// Run one cycle attempt and return the number of events pushed downstream.
    ///
    /// Every event is encoded before the checkpoint moves, so an encoding
    /// failure leaves the checkpoint where it was.
    pub async fn collect_once(&mut self) -> Result<usize> {
        let checkpoint = self.checkpoint.load();
        let bounds = ScanBounds {
            checkpoint: checkpoint.as_deref(),
            cutoff: Utc::now() - self.settings.lookback,
            max_pages: self.settings.max_pages,
        };

        let gathered = gather(&self.source, &self.settings.first_link, &bounds).await?;

        tracing::info!(
            pages = gathered.pages,
            events = gathered.events.len(),
            stop = ?gathered.stop,
            checkpoint = checkpoint.as_deref().unwrap_or(""),
            "Gathered audit events"
        );

        let newest = gathered.events.first().map(|event| event.guid.clone());
        let payloads = gathered
            .events
            .into_iter()
            .map(AuditEvent::into_payload)
            .collect::<serde_json::Result<Vec<_>>>()?;

        if let Some(guid) = newest {
            self.checkpoint.store(guid);
        }

        let count = payloads.len();
        for payload in payloads {
            self.destination
                .send(payload)
                .await
                .map_err(|_| Error::ChannelClosed("deduplicator"))?;
        }
        self.stats.events_emitted += count as u64;

        Ok(count)
    }

    /// Run one tick: retry failed attempts with backoff up to `max_attempts`.
    pub async fn collect_with_retry(&mut self) -> Result<usize> {
        let max_attempts = self.settings.max_attempts;
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.collect_once().await {
                Ok(count) => {
                    self.stats.cycles += 1;
                    return Ok(count);
                }
                Err(e) if e.is_transient() => {
                    self.stats.failed_attempts += 1;
                    if attempt >= max_attempts {
                        return Err(Error::RetriesExhausted {
                            attempts: attempt,
                            last: Box::new(e),
                        });
                    }

                    let delay = self.backoff.next_delay(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        delay = ?delay,
                        error = %e,
                        "Collection attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    self.stats.failed_attempts += 1;
                    return Err(e);
                }
            }
        }
    }

    /// Collect every `cadence` until a tick fails for good.
    ///
    /// The first cycle runs one full cadence after start. Only returns on error.
    pub async fn run(mut self, cadence: Duration) -> Result<()> {
        let mut ticker = tokio::time::interval_at(Instant::now() + cadence, cadence);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(cadence = ?cadence, "Collector started");

        loop {
            ticker.tick().await;
            tracing::debug!("Collector tick");

            let count = self.collect_with_retry().await?;
            tracing::info!(
                events = count,
                total = self.stats.events_emitted,
                "Collection cycle complete"
            );
        }
    }
}
