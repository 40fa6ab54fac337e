//! Stage wiring: collector → deduplicator → shipper
//!
//! Each stage runs as its own tokio task and owns its state outright. The only
//! things shared are the two bounded channels between them, so a slow sink
//! backs up into the deduplicator and then into the collector's sends.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::auth::Authenticator;
use crate::collector::{
    AuditEventClient, BackoffPolicy, CollectorSettings, EventCollector, MemoryCheckpoint,
    PageSource,
};
use crate::config::Config;
use crate::dedup::Deduplicator;
use crate::error::{Error, Result};
use crate::shipper::{EventSink, Shipper, SplunkClient};

/// Counts reported by a single-cycle run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub collected: u64,
    pub forwarded: u64,
    pub duplicates: u64,
    pub shipped: u64,
    pub ship_failures: u64,
}

/// The three stages and the channels between them, ready to start
pub struct Pipeline<S, K> {
    collector: EventCollector<S>,
    deduplicator: Deduplicator,
    shipper: Shipper<K>,
    collected: mpsc::Receiver<Vec<u8>>,
    unique: mpsc::Sender<Vec<u8>>,
    shippable: mpsc::Receiver<Vec<u8>>,
    cadence: Duration,
}

/// Validate configuration, authenticate once and build the production pipeline.
///
/// Any failure here is a startup failure; nothing is retried.
pub async fn connect(config: &Config) -> Result<Pipeline<AuditEventClient, SplunkClient>> {
    config.validate()?;

    let mut auth = Authenticator::new(&config.uaa)?;
    auth.authenticate().await?;

    let source = AuditEventClient::new(&config.cloud_foundry, auth.access_token())?;
    let sink = SplunkClient::new(&config.shipper)?;

    Ok(Pipeline::new(source, sink, config))
}

impl<S, K> Pipeline<S, K>
where
    S: PageSource + 'static,
    K: EventSink + 'static,
{
    pub fn new(source: S, sink: K, config: &Config) -> Self {
        let capacity = config.pipeline.channel_capacity.max(1);
        let (collected_tx, collected) = mpsc::channel(capacity);
        let (unique, shippable) = mpsc::channel(capacity);

        let settings = CollectorSettings::from_config(&config.cloud_foundry, &config.collector);

        Self {
            collector: EventCollector::new(source, MemoryCheckpoint::default(), collected_tx, settings),
            deduplicator: Deduplicator::from_config(&config.deduplicator),
            shipper: Shipper::from_config(sink, &config.shipper),
            collected,
            unique,
            shippable,
            cadence: config.collector.scrape_cadence(),
        }
    }

    /// Replace the collector's retry backoff
    pub fn with_backoff(mut self, backoff: impl BackoffPolicy + 'static) -> Self {
        self.collector = self.collector.with_backoff(backoff);
        self
    }

    fn spawn_downstream(self) -> (EventCollector<S>, JoinHandle<Result<()>>, JoinHandle<Result<()>>, Duration) {
        let dedup = tokio::spawn(self.deduplicator.run(self.collected, self.unique));
        let ship = tokio::spawn(self.shipper.run(self.shippable));
        (self.collector, dedup, ship, self.cadence)
    }

    /// Run until the collector fails for good or a stage stops.
    ///
    /// Never returns `Ok`: every exit path is either the collector's fatal
    /// error or a stage that quit while the others were running.
    pub async fn run(self) -> Result<()> {
        let (collector, mut dedup, mut ship, cadence) = self.spawn_downstream();
        let mut collect = tokio::spawn(collector.run(cadence));

        // Downstream stages stop once the collector's sender drops, so its
        // error wins when several are ready together.
        let outcome = tokio::select! {
            biased;
            res = &mut collect => stage_result("collector", res),
            res = &mut dedup => stage_result("deduplicator", res),
            res = &mut ship => stage_result("shipper", res),
        };

        collect.abort();
        dedup.abort();
        ship.abort();
        outcome
    }

    /// Run one collection tick, drain it through every stage and report counts.
    pub async fn run_once(self) -> Result<RunSummary> {
        let dedup_stats = self.deduplicator.stats();
        let ship_stats = self.shipper.stats();
        let (mut collector, dedup, ship, _) = self.spawn_downstream();

        let collected = collector.collect_with_retry().await;
        // Closing the first channel lets both downstream stages drain and exit
        drop(collector);

        let dedup_result = join("deduplicator", dedup).await;
        let ship_result = join("shipper", ship).await;
        let collected = collected?;
        dedup_result?;
        ship_result?;

        Ok(RunSummary {
            collected: collected as u64,
            forwarded: dedup_stats.forwarded(),
            duplicates: dedup_stats.dropped(),
            shipped: ship_stats.events_sent(),
            ship_failures: ship_stats.events_dropped(),
        })
    }
}

/// Any stage finishing while the pipeline runs is a failure.
fn stage_result(
    stage: &'static str,
    res: std::result::Result<Result<()>, tokio::task::JoinError>,
) -> Result<()> {
    match res {
        Ok(Err(e)) => {
            tracing::error!(stage, error = %e, "Pipeline stage failed");
            Err(e)
        }
        Ok(Ok(())) => Err(Error::StageStopped(stage)),
        Err(join_error) => {
            tracing::error!(stage, error = %join_error, "Pipeline stage panicked");
            Err(Error::StageStopped(stage))
        }
    }
}

async fn join(stage: &'static str, handle: JoinHandle<Result<()>>) -> Result<()> {
    handle.await.map_err(|_| Error::StageStopped(stage))?
}
