use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::worker::invoke_bounded;
use super::*;
use crate::test_utils::enable_logger;
use crate::test_utils::function;
use crate::test_utils::publish;
use crate::test_utils::router_config;
use crate::test_utils::static_cache;
use crate::test_utils::subscription;
use crate::test_utils::RecordingInvoker;
use crate::DeliveryMode;
use crate::DispatchError;
use crate::Event;
use crate::FunctionResponse;
use crate::InvokeError;
use crate::RouterMetrics;

fn async_router(
    invoker: Arc<dyn FunctionInvoker>,
    workers: usize,
) -> (Router, RouterMetrics) {
    enable_logger();
    let cache = static_cache(
        vec![function("a")],
        vec![subscription(DeliveryMode::Async, "user.created", "a", "/")],
    );
    let metrics = RouterMetrics::new_unregistered();
    let router = Router::new(
        cache,
        PluginManager::default(),
        invoker,
        router_config(workers, 16),
        metrics.clone(),
    );
    (router, metrics)
}

#[tokio::test]
async fn test_non_success_answer_counts_as_delivery_failure() {
    let (router, metrics) = async_router(Arc::new(RecordingInvoker::new(500)), 1);
    router.start_workers();

    router
        .dispatch(publish("user.created", "/"), &CancellationToken::new())
        .await
        .unwrap();
    router.drain().await;

    assert_eq!(metrics.delivery_failures.get(), 1);
}

#[tokio::test]
async fn test_transport_error_is_absorbed_and_counted() {
    let mut invoker = MockFunctionInvoker::new();
    invoker
        .expect_invoke()
        .times(2)
        .returning(|_, _| Err(InvokeError::Transport("connection reset".into())));
    let (router, metrics) = async_router(Arc::new(invoker), 2);
    router.start_workers();

    for _ in 0..2 {
        let outcome = router
            .dispatch(publish("user.created", "/"), &CancellationToken::new())
            .await;
        assert!(outcome.is_ok(), "publisher must not see delivery failures");
    }
    let report = router.drain().await;

    assert!(report.completed);
    assert_eq!(metrics.delivery_failures.get(), 2);
}

#[tokio::test]
async fn test_start_workers_is_idempotent() {
    let invoker = Arc::new(RecordingInvoker::new(200));
    let (router, _) = async_router(invoker.clone(), 2);
    router.start_workers();
    router.start_workers();

    router
        .dispatch(publish("user.created", "/"), &CancellationToken::new())
        .await
        .unwrap();
    router.drain().await;

    assert_eq!(invoker.calls().len(), 1);
}

#[tokio::test]
async fn test_drain_without_workers_abandons_queue() {
    let (router, metrics) = async_router(Arc::new(RecordingInvoker::new(200)), 1);

    router
        .dispatch(publish("user.created", "/"), &CancellationToken::new())
        .await
        .unwrap();
    let report = router.drain().await;

    assert_eq!(report.abandoned, 1);
    assert_eq!(metrics.abandoned_jobs.get(), 1);
}

#[tokio::test]
async fn test_invoke_bounded_maps_invoker_timeout() {
    let mut invoker = MockFunctionInvoker::new();
    invoker
        .expect_invoke()
        .returning(|_, _| Err(InvokeError::Timeout(Duration::from_millis(7))));

    let err = invoke_bounded(
        &invoker,
        &function("a"),
        &Event::new("user.created", serde_json::Value::Null),
        Duration::from_secs(1),
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DispatchError::Timeout { elapsed, .. } if elapsed == Duration::from_millis(7)));
}

#[tokio::test]
async fn test_invoke_bounded_prefers_cancellation() {
    let mut invoker = MockFunctionInvoker::new();
    invoker
        .expect_invoke()
        .returning(|_, _| Ok(FunctionResponse::new(200, "late")));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = invoke_bounded(
        &invoker,
        &function("a"),
        &Event::new("user.created", serde_json::Value::Null),
        Duration::from_secs(1),
        &cancel,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DispatchError::Cancelled));
}
