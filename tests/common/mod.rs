use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use event_gateway::cache::TargetCache;
use event_gateway::plugin::BuiltinLoader;
use event_gateway::plugin::PluginManager;
use event_gateway::router::FunctionInvoker;
use event_gateway::router::Router;
use event_gateway::service::ConfigService;
use event_gateway::store::KeySpace;
use event_gateway::store::MemStore;
use event_gateway::BackoffPolicy;
use event_gateway::CacheConfig;
use event_gateway::CacheMetrics;
use event_gateway::DeliveryMode;
use event_gateway::Event;
use event_gateway::Function;
use event_gateway::FunctionResponse;
use event_gateway::InvokeError;
use event_gateway::RouterConfig;
use event_gateway::RouterMetrics;
use event_gateway::Subscription;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

pub const PREFIX: &str = "/serverless-event-gateway";

pub const WAIT_FOR_CACHE: Duration = Duration::from_secs(3);

pub fn enable_logger() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Invoker answering `{function_id} handled {event_type}` with a fixed status.
pub struct RecordingInvoker {
    pub status: u16,
    calls: Mutex<Vec<(String, Event)>>,
}

impl RecordingInvoker {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, Event)> {
        self.calls.lock().clone()
    }

    pub fn called_functions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.calls.lock().iter().map(|(id, _)| id.clone()).collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl FunctionInvoker for RecordingInvoker {
    async fn invoke(
        &self,
        function: &Function,
        event: &Event,
    ) -> Result<FunctionResponse, InvokeError> {
        self.calls
            .lock()
            .push((function.function_id.clone(), event.clone()));
        Ok(FunctionResponse::new(
            self.status,
            format!("{} handled {}", function.function_id, event.event_type),
        ))
    }
}

/// The full gateway stack on an embedded store, without HTTP listeners.
pub struct Gateway {
    pub store: Arc<MemStore>,
    pub service: ConfigService,
    pub cache: Arc<TargetCache>,
    pub router: Router,
    pub invoker: Arc<RecordingInvoker>,
    pub router_metrics: RouterMetrics,
    pub cache_metrics: CacheMetrics,
    pub shutdown: CancellationToken,
}

impl Gateway {
    pub async fn start(
        workers: usize,
        queue_capacity: usize,
        plugin_locations: &[String],
    ) -> Self {
        enable_logger();
        let store = Arc::new(MemStore::new(64));
        let service = ConfigService::new(store.clone(), KeySpace::new(PREFIX));
        let shutdown = CancellationToken::new();

        let cache_config = CacheConfig {
            prefix: PREFIX.to_string(),
            resync_interval_ms: 0,
            watch_backoff: BackoffPolicy {
                max_retries: 0,
                timeout_ms: 1000,
                base_delay_ms: 10,
                max_delay_ms: 50,
            },
        };
        let cache_metrics = CacheMetrics::new_unregistered();
        let cache = Arc::new(
            TargetCache::start(store.clone(), &cache_config, cache_metrics.clone(), shutdown.clone())
                .await
                .expect("cache starts"),
        );

        let plugins = PluginManager::connect(plugin_locations, &BuiltinLoader::default())
            .await
            .expect("plugins load");
        let invoker = Arc::new(RecordingInvoker::new(200));
        let router_metrics = RouterMetrics::new_unregistered();
        let router = Router::new(
            cache.clone(),
            plugins,
            invoker.clone(),
            RouterConfig {
                workers,
                queue_capacity,
                function_timeout_ms: 1000,
                drain_timeout_ms: 2000,
            },
            router_metrics.clone(),
        );

        Self {
            store,
            service,
            cache,
            router,
            invoker,
            router_metrics,
            cache_metrics,
            shutdown,
        }
    }

    /// Waits until the cache has caught up with every store write.
    pub async fn settle(&self) {
        let target = self.store.revision();
        let deadline = tokio::time::Instant::now() + WAIT_FOR_CACHE;
        while self.cache.revision() < target {
            assert!(
                tokio::time::Instant::now() < deadline,
                "cache stuck at revision {} (store at {})",
                self.cache.revision(),
                target
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    pub async fn register(
        &self,
        function_id: &str,
    ) {
        self.service
            .create_function(Function::http(
                "default",
                function_id,
                format!("http://{}.local/", function_id),
            ))
            .await
            .expect("function registered");
    }

    pub async fn subscribe(
        &self,
        mode: DeliveryMode,
        event_type: &str,
        function_id: &str,
        path: &str,
    ) -> Subscription {
        self.service
            .create_subscription(Subscription::new(mode, event_type, function_id, path, "POST"))
            .await
            .expect("subscription registered")
    }

    pub async fn stop(&self) {
        self.router.drain().await;
        self.shutdown.cancel();
        self.cache.stopped().await;
    }
}
