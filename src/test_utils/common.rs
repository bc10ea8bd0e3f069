use std::sync::Arc;

use serde_json::json;
use tracing_subscriber::EnvFilter;

use crate::cache::TargetCache;
use crate::cache::TargetSnapshot;
use crate::DeliveryMode;
use crate::DispatchRequest;
use crate::Event;
use crate::Function;
use crate::RouterConfig;
use crate::Subscription;

pub fn enable_logger() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn function(id: &str) -> Function {
    Function::http("default", id, format!("http://{}.functions.local/", id))
}

pub fn subscription(
    mode: DeliveryMode,
    event_type: &str,
    function_id: &str,
    path: &str,
) -> Subscription {
    Subscription::new(mode, event_type, function_id, path, "POST")
}

/// Static cache over the given entries, registered in order.
pub fn static_cache(
    functions: Vec<Function>,
    subscriptions: Vec<Subscription>,
) -> Arc<TargetCache> {
    Arc::new(TargetCache::from_snapshot(TargetSnapshot::from_entries(
        functions,
        subscriptions,
    )))
}

/// `POST path` carrying a custom event of `event_type`.
pub fn publish(
    event_type: &str,
    path: &str,
) -> DispatchRequest {
    DispatchRequest::new(path, "POST", Event::new(event_type, json!({"hello": "world"})))
}

pub fn router_config(
    workers: usize,
    queue_capacity: usize,
) -> RouterConfig {
    RouterConfig {
        workers,
        queue_capacity,
        function_timeout_ms: 1000,
        drain_timeout_ms: 2000,
    }
}
