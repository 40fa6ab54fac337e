//! Approximate deduplication of serialized events
//!
//! The deduplicator owns its filter outright; no other stage can observe or
//! reset it. Payloads are compared byte for byte after anonymization, so two
//! events that encode identically are treated as the same event. A filter
//! false positive drops a genuinely new event without any error.

mod filter;

pub use filter::{BloomFilter, ExactFilter, MembershipFilter};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::mpsc;

use crate::config::DeduplicatorConfig;
use crate::error::{Error, Result};

/// Decision for one payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// First sighting, sent downstream
    Forward,
    /// Already seen (or a false positive), dropped
    Duplicate,
}

/// Counters readable while the deduplicator runs
#[derive(Debug, Default)]
pub struct DedupStats {
    forwarded: AtomicU64,
    dropped: AtomicU64,
}

impl DedupStats {
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Forwards first-seen payloads and drops repeats
pub struct Deduplicator<F = BloomFilter> {
    filter: F,
    stats: Arc<DedupStats>,
}

impl Deduplicator<BloomFilter> {
    pub fn from_config(config: &DeduplicatorConfig) -> Self {
        Self::new(BloomFilter::from_config(config))
    }
}

impl<F: MembershipFilter> Deduplicator<F> {
    pub fn new(filter: F) -> Self {
        Self {
            filter,
            stats: Arc::new(DedupStats::default()),
        }
    }

    /// Shared handle to the forward/drop counters
    pub fn stats(&self) -> Arc<DedupStats> {
        Arc::clone(&self.stats)
    }

    /// Test `payload` against the filter and record it if it is new.
    ///
    /// Every drop is logged at info, since a false positive loses a real
    /// event and nothing else reports it.
    pub fn check(&mut self, payload: &[u8]) -> Verdict {
        if self.filter.contains(payload) {
            let dropped = self.stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            let digest = Sha256::digest(payload);
            tracing::info!(
                digest = %hex::encode(&digest[..8]),
                dropped,
                forwarded = self.stats.forwarded(),
                "Deduplicated an event"
            );
            Verdict::Duplicate
        } else {
            self.filter.insert(payload);
            self.stats.forwarded.fetch_add(1, Ordering::Relaxed);
            Verdict::Forward
        }
    }

    /// Pull from `source` until it closes, forwarding unique payloads.
    ///
    /// Fails if `destination` has been dropped.
    pub async fn run(
        mut self,
        mut source: mpsc::Receiver<Vec<u8>>,
        destination: mpsc::Sender<Vec<u8>>,
    ) -> Result<()> {
        tracing::info!("Deduplicator started");

        while let Some(payload) = source.recv().await {
            if self.check(&payload) == Verdict::Forward {
                destination
                    .send(payload)
                    .await
                    .map_err(|_| Error::ChannelClosed("shipper"))?;
            }
        }

        tracing::info!(
            forwarded = self.stats.forwarded(),
            dropped = self.stats.dropped(),
            "Deduplicator input closed"
        );
        Ok(())
    }
}
