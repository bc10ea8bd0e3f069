use std::sync::Arc;

use event_gateway::api;
use event_gateway::cache::TargetCache;
use event_gateway::plugin::BuiltinLoader;
use event_gateway::plugin::PluginManager;
use event_gateway::router::HttpInvoker;
use event_gateway::router::Router;
use event_gateway::service::ConfigService;
use event_gateway::store::KeySpace;
use event_gateway::store::KvStore;
use event_gateway::store::MemStore;
use event_gateway::CacheMetrics;
use event_gateway::GatewayConfig;
use event_gateway::LogConfig;
use event_gateway::LogFormat;
use event_gateway::Result;
use event_gateway::RouterMetrics;
use event_gateway::ShutdownGuard;
use tokio::task::JoinHandle;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    if std::env::args().any(|arg| arg == "--version" || arg == "-V") {
        println!("event-gateway {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let settings = GatewayConfig::new()?.validate()?;

    // Initializing Logs
    let _guard = init_observability(&settings.log)?;

    // Initializing Shutdown Signal
    let shutdown = ShutdownGuard::new();

    if let Err(e) = run(settings, &shutdown).await {
        error!("event gateway stopped: {:?}", e);
        shutdown.shutdown();
        return Err(e);
    }

    info!("Exiting program.");
    Ok(())
}

async fn run(
    settings: GatewayConfig,
    shutdown: &ShutdownGuard,
) -> Result<()> {
    let store: Arc<dyn KvStore> = Arc::new(MemStore::new(settings.store.watch_buffer));
    let keys = KeySpace::new(settings.cache.prefix.clone());

    let plugins = PluginManager::connect(&settings.plugins.locations, &BuiltinLoader::default()).await?;
    info!(plugins = ?plugins.names(), "plugin pipeline ready");
    let cache = Arc::new(
        TargetCache::start(
            store.clone(),
            &settings.cache,
            CacheMetrics::global(),
            shutdown.token(),
        )
        .await?,
    );

    let invoker = Arc::new(HttpInvoker::new(settings.router.function_timeout())?);
    let router = Arc::new(Router::new(
        cache.clone(),
        plugins.clone(),
        invoker,
        settings.router.clone(),
        RouterMetrics::global(),
    ));
    router.start_workers();

    let service = Arc::new(ConfigService::new(store, keys));
    let mut servers: Vec<JoinHandle<()>> = vec![
        spawn_server(
            "events",
            shutdown,
            api::serve(
                "events",
                settings.api.events.clone(),
                api::events_routes(router.clone()),
                shutdown.token(),
            ),
        ),
        spawn_server(
            "config",
            shutdown,
            api::serve(
                "config",
                settings.api.config.clone(),
                api::config_routes(service),
                shutdown.token(),
            ),
        ),
    ];
    if settings.monitoring.prometheus_enabled {
        servers.push(spawn_server(
            "metrics",
            shutdown,
            event_gateway::start_server(settings.monitoring.prometheus_port, shutdown.token()),
        ));
    }

    info!("Application started. Waiting for CTRL+C signal...");
    shutdown.listen_for_signals();
    shutdown.wait().await;

    shutdown.mark_draining();
    let report = router.drain().await;
    if !report.completed {
        warn!(abandoned = report.abandoned, "drain finished with abandoned jobs");
    }
    plugins.kill().await;
    cache.stopped().await;
    for server in servers {
        if let Err(e) = server.await {
            error!("listener task panicked: {:?}", e);
        }
    }
    shutdown.mark_exited();
    Ok(())
}

/// Runs a listener; a listener that fails triggers shutdown of the others.
fn spawn_server(
    name: &'static str,
    shutdown: &ShutdownGuard,
    server: impl std::future::Future<Output = Result<()>> + Send + 'static,
) -> JoinHandle<()> {
    let shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("{} listener failed: {:?}", name, e);
            shutdown.shutdown();
        }
    })
}

pub fn init_observability(config: &LogConfig) -> Result<WorkerGuard> {
    let (writer, guard) = match &config.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            tracing_appender::non_blocking(tracing_appender::rolling::never(dir, "event-gateway.log"))
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
    };
    tracing_subscriber::registry().with(layer).init();

    Ok(guard)
}
