use event_gateway::DeliveryMode;
use event_gateway::DispatchError;
use event_gateway::DispatchOutcome;
use event_gateway::DispatchRequest;
use event_gateway::Event;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::common::Gateway;

fn publish(
    event_type: &str,
    path: &str,
) -> DispatchRequest {
    DispatchRequest::new(path, "POST", Event::new(event_type, json!({"id": 1})))
}

#[tokio::test]
async fn test_registered_sync_subscription_answers_verbatim() {
    let gateway = Gateway::start(2, 16, &[]).await;
    gateway.register("fnA").await;
    gateway
        .subscribe(DeliveryMode::Sync, "user.created", "fnA", "/foo")
        .await;
    gateway.settle().await;

    let outcome = gateway
        .router
        .dispatch(publish("user.created", "/foo"), &CancellationToken::new())
        .await
        .unwrap();
    let DispatchOutcome::Response { response, .. } = outcome else {
        panic!("expected a sync response, got {:?}", outcome);
    };
    assert_eq!(response.status, 200);
    assert_eq!(response.body.as_ref(), b"fnA handled user.created");

    let err = gateway
        .router
        .dispatch(publish("user.deleted", "/foo"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::NotFound { .. }));

    gateway.stop().await;
}

#[tokio::test]
async fn test_two_async_subscriptions_are_both_delivered() {
    let gateway = Gateway::start(2, 16, &[]).await;
    gateway.register("fnA").await;
    gateway.register("fnB").await;
    gateway
        .subscribe(DeliveryMode::Async, "order.placed", "fnA", "/")
        .await;
    gateway
        .subscribe(DeliveryMode::Async, "order.placed", "fnB", "/")
        .await;
    gateway.settle().await;
    gateway.router.start_workers();

    let outcome = gateway
        .router
        .dispatch(publish("order.placed", "/"), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, DispatchOutcome::Accepted { queued: 2, dropped: 0 });

    let report = gateway.router.drain().await;
    assert!(report.completed);
    assert_eq!(gateway.invoker.called_functions(), vec!["fnA", "fnB"]);

    gateway.stop().await;
}

#[tokio::test]
async fn test_publishing_without_subscribers_is_a_no_op() {
    let gateway = Gateway::start(1, 4, &[]).await;

    let outcome = gateway
        .router
        .dispatch(publish("nobody.listens", "/"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, DispatchOutcome::Accepted { queued: 0, dropped: 0 });
    gateway.stop().await;
}

#[tokio::test]
async fn test_full_queue_drops_and_counts_each_job_once() {
    let gateway = Gateway::start(1, 1, &[]).await;
    gateway.register("fnA").await;
    gateway
        .subscribe(DeliveryMode::Async, "metric.sample", "fnA", "/")
        .await;
    gateway.settle().await;

    // Workers are not started, so the single slot stays taken
    for expected_dropped in [0, 1, 1] {
        let outcome = gateway
            .router
            .dispatch(publish("metric.sample", "/"), &CancellationToken::new())
            .await
            .unwrap();
        let DispatchOutcome::Accepted { dropped, .. } = outcome else {
            panic!("async publish must be acknowledged");
        };
        assert_eq!(dropped, expected_dropped);
    }
    assert_eq!(gateway.router_metrics.dropped_events.get(), 2);

    gateway.router.start_workers();
    let report = gateway.router.drain().await;
    assert!(report.completed);
    assert_eq!(gateway.invoker.calls().len(), 1);

    gateway.stop().await;
}

#[tokio::test]
async fn test_deny_plugin_rejects_before_delivery() {
    let gateway = Gateway::start(1, 4, &["deny:user.banned".to_string()]).await;
    gateway.register("fnA").await;
    gateway
        .subscribe(DeliveryMode::Sync, "user.banned", "fnA", "/users")
        .await;
    gateway.settle().await;

    let err = gateway
        .router
        .dispatch(publish("user.banned", "/users"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(&err, DispatchError::Rejected { .. }));
    assert!(err.to_string().contains("event type user.banned is denied"));
    assert!(gateway.invoker.calls().is_empty());
    gateway.stop().await;
}

#[tokio::test]
async fn test_dispatch_after_drain_is_refused() {
    let gateway = Gateway::start(1, 4, &[]).await;
    gateway.router.start_workers();
    gateway.router.drain().await;

    let err = gateway
        .router
        .dispatch(publish("user.created", "/"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::ShuttingDown));
    gateway.stop().await;
}
