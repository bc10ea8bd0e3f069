//! Watch-driven reconciliation of the target cache.
//!
//! The maintainer is the only writer of the shared snapshot. A watch on the
//! gateway prefix is opened before every full listing, so no change can slip
//! between the two; events already covered by the listing are skipped by
//! revision. Any watch failure (error, gap or end of stream) leads to a
//! backoff and a full resync, during which readers keep the last good view.

use std::future::pending;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use futures::StreamExt;
use tokio::time::interval_at;
use tokio::time::timeout;
use tokio::time::Instant;
use tokio::time::Interval;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::TargetSnapshot;
use crate::store::KeySpace;
use crate::store::KvStore;
use crate::store::ReadConsistency;
use crate::store::WatchEvent;
use crate::store::WatchStream;
use crate::utils::async_task::backoff_delay;
use crate::BackoffPolicy;
use crate::CacheMetrics;
use crate::Result;
use crate::StoreError;

pub struct CacheMaintainer {
    store: Arc<dyn KvStore>,
    keys: KeySpace,
    snapshot: Arc<ArcSwap<TargetSnapshot>>,
    backoff: BackoffPolicy,
    resync_interval: Option<Duration>,
    metrics: CacheMetrics,
    shutdown: CancellationToken,
}

impl CacheMaintainer {
    pub(crate) fn new(
        store: Arc<dyn KvStore>,
        keys: KeySpace,
        snapshot: Arc<ArcSwap<TargetSnapshot>>,
        backoff: BackoffPolicy,
        resync_interval: Option<Duration>,
        metrics: CacheMetrics,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            keys,
            snapshot,
            backoff,
            resync_interval,
            metrics,
            shutdown,
        }
    }

    /// Opens a watch, lists the whole prefix and publishes the resulting
    /// snapshot. Returns the watch to continue from.
    pub(crate) async fn synchronize(&self) -> std::result::Result<WatchStream, StoreError> {
        let root = self.keys.root();
        let stream = self.bounded(self.store.watch(&root)).await?;
        let listing = self
            .bounded(self.store.list(&root, ReadConsistency::Linearizable))
            .await?;

        let snapshot = TargetSnapshot::load(&self.keys, &listing);
        info!(
            revision = snapshot.revision(),
            functions = snapshot.functions(None).len(),
            subscriptions = snapshot.subscriptions(None).len(),
            "target cache synchronized"
        );
        self.snapshot.store(Arc::new(snapshot));
        self.metrics.resyncs.inc();
        Ok(stream)
    }

    async fn bounded<T>(
        &self,
        op: impl Future<Output = std::result::Result<T, StoreError>>,
    ) -> std::result::Result<T, StoreError> {
        timeout(self.backoff.timeout(), op)
            .await
            .map_err(|_| StoreError::Unavailable(format!("no answer within {:?}", self.backoff.timeout())))?
    }

    /// Keeps the snapshot in line with the store until shutdown.
    pub async fn run(
        self,
        mut stream: WatchStream,
    ) -> Result<()> {
        let mut resync = self
            .resync_interval
            .map(|period| interval_at(Instant::now() + period, period));

        loop {
            let item = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("target cache maintainer stopped");
                    return Ok(());
                }
                _ = tick(&mut resync) => {
                    self.periodic_resync(&mut stream).await;
                    continue;
                }
                item = stream.next() => item,
            };

            match item {
                Some(Ok(event)) => self.apply(event),
                Some(Err(e)) => {
                    warn!(error = %e, "target cache watch failed");
                    self.metrics.watch_errors.inc();
                    match self.reconnect().await {
                        Some(next) => stream = next,
                        None => return Ok(()),
                    }
                }
                None => {
                    warn!("target cache watch ended");
                    self.metrics.watch_errors.inc();
                    match self.reconnect().await {
                        Some(next) => stream = next,
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    fn apply(
        &self,
        event: WatchEvent,
    ) {
        let mut next = TargetSnapshot::clone(&self.snapshot.load());
        if next.apply(&self.keys, &event) {
            debug!(kind = ?event.kind, key = %event.key, revision = event.revision, "target cache updated");
            self.snapshot.store(Arc::new(next));
        }
    }

    async fn periodic_resync(
        &self,
        stream: &mut WatchStream,
    ) {
        match self.synchronize().await {
            Ok(fresh) => *stream = fresh,
            Err(e) => {
                warn!(error = %e, "periodic resync failed, serving last good snapshot");
                self.metrics.watch_errors.inc();
            }
        }
    }

    /// Retries [`Self::synchronize`] with backoff until it succeeds. `None`
    /// means shutdown was requested while waiting.
    ///
    /// The store is never given up on: once `max_retries` attempts have
    /// failed the outage is reported at error level, and retries continue at
    /// the capped delay.
    async fn reconnect(&self) -> Option<WatchStream> {
        let mut attempt: u32 = 0;
        loop {
            let delay = backoff_delay(&self.backoff, attempt);
            debug!(attempt, ?delay, "target cache reconnecting");
            tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }

            match self.synchronize().await {
                Ok(stream) => {
                    info!(attempt, "target cache watch re-established");
                    return Some(stream);
                }
                Err(e) => {
                    attempt = attempt.saturating_add(1);
                    warn!(attempt, error = %e, "target cache resync failed");
                    self.metrics.watch_errors.inc();
                    if attempt as usize == self.backoff.max_retries {
                        error!(attempt, "target cache still cannot reach the store, serving last good snapshot");
                    }
                }
            }
        }
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending::<()>().await,
    }
}
