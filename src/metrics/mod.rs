//! Prometheus metrics of the gateway.
//!
//! Every collector lives in [`REGISTRY`] and is exposed on `/metrics` by
//! [`start_server`]. Components receive their handles through
//! [`RouterMetrics`] and [`CacheMetrics`] so tests can count on private,
//! unregistered instances.


use std::net::SocketAddr;
use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::Encoder;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounter;
use prometheus::Registry;
use prometheus::TextEncoder;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

use crate::Error;
use crate::Result;

lazy_static! {
    pub static ref REQUEST_DURATION: HistogramVec = request_duration_histogram();

    pub static ref DROPPED_EVENTS: IntCounter = IntCounter::new(
        "event_gateway_dropped_events_total",
        "Async dispatch jobs dropped because the queue was full"
    )
    .expect("metric can not be created");

    pub static ref ASYNC_DELIVERY_FAILURES: IntCounter = IntCounter::new(
        "event_gateway_async_delivery_failures_total",
        "Async deliveries that failed or timed out"
    )
    .expect("metric can not be created");

    pub static ref ABANDONED_JOBS: IntCounter = IntCounter::new(
        "event_gateway_abandoned_jobs_total",
        "Queued or in-flight jobs abandoned at the drain deadline"
    )
    .expect("metric can not be created");

    pub static ref CACHE_RESYNCS: IntCounter = IntCounter::new(
        "event_gateway_cache_resyncs_total",
        "Full target cache resynchronizations"
    )
    .expect("metric can not be created");

    pub static ref CACHE_WATCH_ERRORS: IntCounter = IntCounter::new(
        "event_gateway_cache_watch_errors_total",
        "Target cache watch stream failures"
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = {
        let registry = Registry::new();
        register_custom_metrics(&registry);
        registry
    };
}

fn request_duration_histogram() -> HistogramVec {
    let buckets = exponential_buckets(0.001, 2.0, 16).expect("buckets are valid");
    HistogramVec::new(
        HistogramOpts::new(
            "event_gateway_request_duration_seconds",
            "Time spent dispatching one inbound event",
        )
        .buckets(buckets),
        &["outcome"],
    )
    .expect("metric can not be created")
}

fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(REQUEST_DURATION.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(DROPPED_EVENTS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(ASYNC_DELIVERY_FAILURES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(ABANDONED_JOBS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(CACHE_RESYNCS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(CACHE_WATCH_ERRORS.clone()))
        .expect("collector can be registered");
}

/// Metric handles used by the router and its workers
#[derive(Clone)]
pub struct RouterMetrics {
    pub request_duration: HistogramVec,
    pub dropped_events: IntCounter,
    pub delivery_failures: IntCounter,
    pub abandoned_jobs: IntCounter,
}

impl RouterMetrics {
    /// Handles backed by the process-wide registry.
    pub fn global() -> Self {
        Self {
            request_duration: REQUEST_DURATION.clone(),
            dropped_events: DROPPED_EVENTS.clone(),
            delivery_failures: ASYNC_DELIVERY_FAILURES.clone(),
            abandoned_jobs: ABANDONED_JOBS.clone(),
        }
    }

    /// Fresh collectors that no registry exports.
    pub fn new_unregistered() -> Self {
        Self {
            request_duration: request_duration_histogram(),
            dropped_events: IntCounter::new("dropped_events", "dropped_events").expect("metric can not be created"),
            delivery_failures: IntCounter::new("delivery_failures", "delivery_failures")
                .expect("metric can not be created"),
            abandoned_jobs: IntCounter::new("abandoned_jobs", "abandoned_jobs").expect("metric can not be created"),
        }
    }

    pub fn observe(
        &self,
        outcome: &str,
        elapsed: Duration,
    ) {
        self.request_duration
            .with_label_values(&[outcome])
            .observe(elapsed.as_secs_f64());
    }
}

/// Metric handles used by the cache maintainer
#[derive(Clone)]
pub struct CacheMetrics {
    pub resyncs: IntCounter,
    pub watch_errors: IntCounter,
}

impl CacheMetrics {
    pub fn global() -> Self {
        Self {
            resyncs: CACHE_RESYNCS.clone(),
            watch_errors: CACHE_WATCH_ERRORS.clone(),
        }
    }

    pub fn new_unregistered() -> Self {
        Self {
            resyncs: IntCounter::new("resyncs", "resyncs").expect("metric can not be created"),
            watch_errors: IntCounter::new("watch_errors", "watch_errors").expect("metric can not be created"),
        }
    }
}

fn routes() -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("metrics").and(warp::get()).and_then(metrics_handler)
}

/// Serves `/metrics` until `shutdown` is cancelled.
pub async fn start_server(
    port: u16,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let (bound, server) = warp::serve(routes())
        .try_bind_with_graceful_shutdown(addr, async move { shutdown.cancelled().await })
        .map_err(|e| Error::Fatal(format!("metrics server failed to bind {}: {}", addr, e)))?;

    info!("metrics server listening on {}", bound);
    server.await;
    Ok(())
}

async fn metrics_handler() -> std::result::Result<impl Reply, Rejection> {
    Ok(encode(&REGISTRY))
}

fn encode(registry: &Registry) -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_else(|e| {
        error!("custom metrics could not be from_utf8'd: {}", e);
        String::default()
    })
}
