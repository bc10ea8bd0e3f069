use std::time::Duration;

use event_gateway::DeliveryMode;
use event_gateway::FunctionKey;

use crate::common::Gateway;

#[tokio::test]
async fn test_cache_follows_registry_writes() {
    let gateway = Gateway::start(1, 4, &[]).await;
    assert!(gateway.cache.list_functions(None).is_empty());

    gateway.register("fnA").await;
    let subscription = gateway
        .subscribe(DeliveryMode::Sync, "user.created", "fnA", "/foo")
        .await;
    gateway.settle().await;

    assert!(gateway.cache.get_function(&FunctionKey::new("default", "fnA")).is_some());
    assert_eq!(
        gateway.cache.sync_target("user.created", "/foo", "POST").map(|t| t.function.function_id.clone()),
        Some("fnA".to_string())
    );

    gateway
        .service
        .delete_subscription(&subscription.key())
        .await
        .unwrap();
    gateway.settle().await;

    assert!(gateway.cache.sync_target("user.created", "/foo", "POST").is_none());
    assert!(gateway.cache.get_subscription(&subscription.key()).is_none());
    gateway.stop().await;
}

#[tokio::test]
async fn test_cache_heals_after_watch_stream_loss() {
    let gateway = Gateway::start(1, 4, &[]).await;
    gateway.register("fnA").await;
    gateway.settle().await;

    gateway.store.close_watches();
    gateway
        .subscribe(DeliveryMode::Async, "user.created", "fnA", "/")
        .await;
    gateway.settle().await;

    assert_eq!(gateway.cache.async_targets("user.created", "/", "POST").len(), 1);
    assert!(gateway.cache_metrics.watch_errors.get() >= 1);
    assert!(gateway.cache_metrics.resyncs.get() >= 2);
    gateway.stop().await;
}

#[tokio::test]
async fn test_cache_serves_last_good_snapshot_during_outage() {
    let gateway = Gateway::start(1, 4, &[]).await;
    gateway.register("fnA").await;
    gateway
        .subscribe(DeliveryMode::Sync, "user.created", "fnA", "/foo")
        .await;
    gateway.settle().await;

    gateway.store.set_available(false);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(gateway.cache.sync_target("user.created", "/foo", "POST").is_some());

    gateway.store.set_available(true);
    gateway.register("fnB").await;
    gateway.settle().await;
    assert!(gateway.cache.get_function(&FunctionKey::new("default", "fnB")).is_some());
    gateway.stop().await;
}
