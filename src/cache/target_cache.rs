use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;

use super::CacheMaintainer;
use super::Target;
use super::TargetSnapshot;
use crate::store::KeySpace;
use crate::store::KvStore;
use crate::utils::async_task::spawn_task;
use crate::CacheConfig;
use crate::CacheMetrics;
use crate::Error;
use crate::Function;
use crate::FunctionKey;
use crate::Result;
use crate::Subscription;
use crate::SubscriptionKey;

/// Concurrent-read mirror of the routing configuration.
///
/// Readers load the current [`TargetSnapshot`] with a single atomic pointer
/// read and never block the maintainer task that replaces it.
pub struct TargetCache {
    snapshot: Arc<ArcSwap<TargetSnapshot>>,
    maintainer: Mutex<Option<JoinHandle<()>>>,
}

impl TargetCache {
    /// Loads the whole gateway prefix and spawns the maintainer.
    ///
    /// Fails when the initial load fails: the gateway cannot serve without a
    /// base configuration.
    pub async fn start(
        store: Arc<dyn KvStore>,
        config: &CacheConfig,
        metrics: CacheMetrics,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let snapshot = Arc::new(ArcSwap::from_pointee(TargetSnapshot::default()));
        let maintainer = CacheMaintainer::new(
            store,
            KeySpace::new(config.prefix.clone()),
            snapshot.clone(),
            config.watch_backoff,
            config.resync_interval(),
            metrics,
            shutdown,
        );

        let stream = maintainer.synchronize().await.map_err(|e| {
            error!(error = %e, "initial target cache load failed");
            Error::Fatal(format!("initial target cache load failed: {}", e))
        })?;

        let mut handles = Vec::with_capacity(1);
        spawn_task("target cache maintainer", move || maintainer.run(stream), Some(&mut handles));
        info!(prefix = %config.prefix, "target cache started");

        Ok(Self {
            snapshot,
            maintainer: Mutex::new(handles.pop()),
        })
    }

    /// Cache over a fixed snapshot, with no store behind it.
    pub fn from_snapshot(snapshot: TargetSnapshot) -> Self {
        Self {
            snapshot: Arc::new(ArcSwap::from_pointee(snapshot)),
            maintainer: Mutex::new(None),
        }
    }

    /// Waits for the maintainer to observe shutdown and exit.
    pub async fn stopped(&self) {
        let handle = self.maintainer.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("target cache maintainer panicked: {:?}", e);
            }
        }
    }

    /// Consistent view for the duration of one request.
    pub fn snapshot(&self) -> Arc<TargetSnapshot> {
        self.snapshot.load_full()
    }

    pub fn revision(&self) -> u64 {
        self.snapshot.load().revision()
    }

    pub fn get_function(
        &self,
        key: &FunctionKey,
    ) -> Option<Arc<Function>> {
        self.snapshot.load().get_function(key)
    }

    pub fn get_subscription(
        &self,
        key: &SubscriptionKey,
    ) -> Option<Arc<Subscription>> {
        self.snapshot.load().get_subscription(key)
    }

    pub fn list_functions(
        &self,
        space: Option<&str>,
    ) -> Vec<Arc<Function>> {
        self.snapshot.load().functions(space)
    }

    pub fn list_subscriptions(
        &self,
        space: Option<&str>,
    ) -> Vec<Arc<Subscription>> {
        self.snapshot.load().subscriptions(space)
    }

    pub fn match_subscriptions(
        &self,
        event_type: &str,
        path: &str,
        method: &str,
    ) -> Vec<Target> {
        self.snapshot.load().match_subscriptions(event_type, path, method)
    }

    pub fn sync_target(
        &self,
        event_type: &str,
        path: &str,
        method: &str,
    ) -> Option<Target> {
        self.snapshot.load().sync_target(event_type, path, method)
    }

    pub fn async_targets(
        &self,
        event_type: &str,
        path: &str,
        method: &str,
    ) -> Vec<Target> {
        self.snapshot.load().async_targets(event_type, path, method)
    }
}
