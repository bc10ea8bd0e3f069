use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::store::KeySpace;
use crate::store::KvEntry;
use crate::store::KvListing;
use crate::store::KvStore;
use crate::store::MemStore;
use crate::store::ReadConsistency;
use crate::store::StoreResult;
use crate::store::WatchStream;
use crate::BackoffPolicy;
use crate::CacheConfig;
use crate::CacheMetrics;
use crate::DeliveryMode;
use crate::Function;
use crate::FunctionKey;
use crate::Subscription;

const PREFIX: &str = "/gw";

fn cache_config() -> CacheConfig {
    CacheConfig {
        prefix: PREFIX.to_string(),
        resync_interval_ms: 0,
        watch_backoff: BackoffPolicy {
            max_retries: 0,
            timeout_ms: 1000,
            base_delay_ms: 10,
            max_delay_ms: 50,
        },
    }
}

async fn put_function(
    store: &MemStore,
    id: &str,
) {
    let f = Function::http("default", id, format!("http://{}.local/", id));
    let key = KeySpace::new(PREFIX).function(&f.key());
    store.put(&key, Bytes::from(serde_json::to_vec(&f).unwrap())).await.unwrap();
}

async fn put_subscription(
    store: &MemStore,
    s: &Subscription,
) {
    let key = KeySpace::new(PREFIX).subscription(&s.key());
    store.put(&key, Bytes::from(serde_json::to_vec(s).unwrap())).await.unwrap();
}

/// Store whose watches stay silent, so only full listings see writes.
struct SilentWatchStore(Arc<MemStore>);

#[async_trait]
impl KvStore for SilentWatchStore {
    async fn get(
        &self,
        key: &str,
        consistency: ReadConsistency,
    ) -> StoreResult<Option<KvEntry>> {
        self.0.get(key, consistency).await
    }

    async fn list(
        &self,
        prefix: &str,
        consistency: ReadConsistency,
    ) -> StoreResult<KvListing> {
        self.0.list(prefix, consistency).await
    }

    async fn put(
        &self,
        key: &str,
        value: Bytes,
    ) -> StoreResult<u64> {
        self.0.put(key, value).await
    }

    async fn delete(
        &self,
        key: &str,
    ) -> StoreResult<bool> {
        self.0.delete(key).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        value: Bytes,
    ) -> StoreResult<u64> {
        self.0.compare_and_swap(key, expected, value).await
    }

    async fn compare_and_delete(
        &self,
        key: &str,
        expected: u64,
    ) -> StoreResult<()> {
        self.0.compare_and_delete(key, expected).await
    }

    async fn watch(
        &self,
        _prefix: &str,
    ) -> StoreResult<WatchStream> {
        Ok(futures::stream::pending().boxed())
    }
}

async fn eventually(check: impl Fn() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

async fn start(
    store: Arc<MemStore>,
    metrics: CacheMetrics,
    shutdown: CancellationToken,
) -> TargetCache {
    TargetCache::start(store, &cache_config(), metrics, shutdown).await.unwrap()
}

#[tokio::test]
async fn test_start_loads_existing_configuration() {
    let store = Arc::new(MemStore::default());
    put_function(&store, "fnA").await;
    put_subscription(
        &store,
        &Subscription::new(DeliveryMode::Sync, "user.created", "fnA", "/foo", "POST"),
    )
    .await;

    let shutdown = CancellationToken::new();
    let cache = start(store.clone(), CacheMetrics::new_unregistered(), shutdown.clone()).await;

    assert!(cache.get_function(&FunctionKey::new("default", "fnA")).is_some());
    assert_eq!(cache.list_subscriptions(None).len(), 1);
    assert!(cache.sync_target("user.created", "/foo", "POST").is_some());
    assert_eq!(cache.revision(), store.revision());

    shutdown.cancel();
    cache.stopped().await;
}

#[tokio::test]
async fn test_start_fails_when_store_is_unreachable() {
    let store = Arc::new(MemStore::default());
    store.set_available(false);

    let result = TargetCache::start(
        store,
        &cache_config(),
        CacheMetrics::new_unregistered(),
        CancellationToken::new(),
    )
    .await;

    assert!(matches!(result, Err(crate::Error::Fatal(_))));
}

#[tokio::test]
async fn test_watch_updates_become_visible() {
    let store = Arc::new(MemStore::default());
    let shutdown = CancellationToken::new();
    let cache = start(store.clone(), CacheMetrics::new_unregistered(), shutdown.clone()).await;

    put_function(&store, "fnA").await;
    put_subscription(
        &store,
        &Subscription::new(DeliveryMode::Async, "user.created", "fnA", "/", "POST"),
    )
    .await;
    eventually(|| cache.async_targets("user.created", "/", "POST").len() == 1).await;

    let key = KeySpace::new(PREFIX).function(&FunctionKey::new("default", "fnA"));
    store.delete(&key).await.unwrap();
    eventually(|| cache.list_functions(None).is_empty()).await;
    assert!(cache.async_targets("user.created", "/", "POST").is_empty());

    shutdown.cancel();
    cache.stopped().await;
}

#[tokio::test]
async fn test_closed_watch_is_healed_by_resync() {
    let store = Arc::new(MemStore::default());
    let metrics = CacheMetrics::new_unregistered();
    let shutdown = CancellationToken::new();
    let cache = start(store.clone(), metrics.clone(), shutdown.clone()).await;
    assert_eq!(metrics.resyncs.get(), 1);

    store.close_watches();
    put_function(&store, "late").await;

    eventually(|| cache.get_function(&FunctionKey::new("default", "late")).is_some()).await;
    assert!(metrics.watch_errors.get() >= 1);
    assert!(metrics.resyncs.get() >= 2);

    shutdown.cancel();
    cache.stopped().await;
}

#[tokio::test]
async fn test_lagging_watch_converges() {
    let store = Arc::new(MemStore::new(1));
    let shutdown = CancellationToken::new();
    let cache = start(store.clone(), CacheMetrics::new_unregistered(), shutdown.clone()).await;

    for i in 0..20 {
        put_function(&store, &format!("fn{}", i)).await;
    }

    eventually(|| cache.list_functions(None).len() == 20).await;

    shutdown.cancel();
    cache.stopped().await;
}

#[tokio::test]
async fn test_outage_keeps_last_good_snapshot() {
    let store = Arc::new(MemStore::default());
    put_function(&store, "fnA").await;
    let metrics = CacheMetrics::new_unregistered();
    let shutdown = CancellationToken::new();
    let cache = start(store.clone(), metrics.clone(), shutdown.clone()).await;

    store.set_available(false);
    eventually(|| metrics.watch_errors.get() >= 2).await;
    assert!(cache.get_function(&FunctionKey::new("default", "fnA")).is_some());

    store.set_available(true);
    put_function(&store, "fnB").await;
    eventually(|| cache.list_functions(None).len() == 2).await;

    shutdown.cancel();
    cache.stopped().await;
}

#[tokio::test]
async fn test_shutdown_stops_maintainer_during_backoff() {
    let store = Arc::new(MemStore::default());
    let shutdown = CancellationToken::new();
    let cache = start(store.clone(), CacheMetrics::new_unregistered(), shutdown.clone()).await;

    store.set_available(false);
    shutdown.cancel();

    tokio::time::timeout(Duration::from_secs(1), cache.stopped())
        .await
        .expect("maintainer should exit on shutdown");
}

#[tokio::test]
async fn test_static_cache_serves_fixed_snapshot() {
    let snapshot = TargetSnapshot::from_entries(
        vec![Function::http("default", "fnA", "http://a.local/")],
        vec![Subscription::new(DeliveryMode::Sync, "user.created", "fnA", "/foo", "POST")],
    );
    let cache = TargetCache::from_snapshot(snapshot);

    assert_eq!(cache.match_subscriptions("user.created", "/foo", "POST").len(), 1);
    cache.stopped().await;
}

#[tokio::test]
async fn test_watch_keeps_retrying_past_max_retries() {
    let store = Arc::new(MemStore::default());
    let mut config = cache_config();
    config.watch_backoff.max_retries = 2;
    let metrics = CacheMetrics::new_unregistered();
    let shutdown = CancellationToken::new();
    let cache = TargetCache::start(store.clone(), &config, metrics.clone(), shutdown.clone())
        .await
        .unwrap();

    store.set_available(false);
    eventually(|| metrics.watch_errors.get() >= 5).await;

    store.set_available(true);
    put_function(&store, "afterOutage").await;
    eventually(|| cache.get_function(&FunctionKey::new("default", "afterOutage")).is_some()).await;

    shutdown.cancel();
    cache.stopped().await;
}

#[tokio::test(start_paused = true)]
async fn test_periodic_resync_picks_up_writes_the_watch_missed() {
    let inner = Arc::new(MemStore::default());
    let mut config = cache_config();
    config.resync_interval_ms = 1000;
    let metrics = CacheMetrics::new_unregistered();
    let shutdown = CancellationToken::new();
    let cache = TargetCache::start(
        Arc::new(SilentWatchStore(inner.clone())),
        &config,
        metrics.clone(),
        shutdown.clone(),
    )
    .await
    .unwrap();

    put_function(&inner, "unseen").await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(cache.get_function(&FunctionKey::new("default", "unseen")).is_none());
    assert_eq!(metrics.resyncs.get(), 1);

    tokio::time::sleep(Duration::from_millis(600)).await;
    eventually(|| cache.get_function(&FunctionKey::new("default", "unseen")).is_some()).await;
    assert!(metrics.resyncs.get() >= 2);
    assert_eq!(cache.revision(), inner.revision());

    shutdown.cancel();
    cache.stopped().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_see_a_target_without_its_function() {
    let store = Arc::new(MemStore::default());
    let shutdown = CancellationToken::new();
    let cache = Arc::new(start(store.clone(), CacheMetrics::new_unregistered(), shutdown.clone()).await);
    let keys = KeySpace::new(PREFIX);
    let subscription = Subscription::new(DeliveryMode::Sync, "user.created", "fnA", "/foo", "POST");

    let stop = Arc::new(AtomicBool::new(false));
    let mut readers = Vec::new();
    for _ in 0..2 {
        let cache = cache.clone();
        let stop = stop.clone();
        readers.push(tokio::spawn(async move {
            let mut seen = 0usize;
            let mut last_revision = 0;
            while !stop.load(Ordering::SeqCst) {
                let snapshot = cache.snapshot();
                assert!(snapshot.revision() >= last_revision);
                last_revision = snapshot.revision();
                for target in snapshot.match_subscriptions("user.created", "/foo", "POST") {
                    let function = snapshot
                        .get_function(&target.function.key())
                        .expect("matched function must be in the same snapshot");
                    assert!(Arc::ptr_eq(&function, &target.function));
                    assert!(snapshot.get_subscription(&target.subscription.key()).is_some());
                    seen += 1;
                }
                tokio::task::yield_now().await;
            }
            seen
        }));
    }

    for _ in 0..50 {
        put_function(&store, "fnA").await;
        put_subscription(&store, &subscription).await;
        eventually(|| cache.sync_target("user.created", "/foo", "POST").is_some()).await;

        store
            .delete(&keys.function(&FunctionKey::new("default", "fnA")))
            .await
            .unwrap();
        store.delete(&keys.subscription(&subscription.key())).await.unwrap();
        eventually(|| cache.list_subscriptions(None).is_empty()).await;
        assert!(cache.match_subscriptions("user.created", "/foo", "POST").is_empty());
    }

    stop.store(true, Ordering::SeqCst);
    let mut seen = 0;
    for reader in readers {
        seen += reader.await.unwrap();
    }
    assert!(seen > 0);

    shutdown.cancel();
    cache.stopped().await;
}
