//! Dispatch engine
//!
//! Every inbound event goes through the same steps: envelope validation,
//! matching against the current cache snapshot, pre-dispatch hooks, then
//! delivery. A sync subscription is called inline and its answer returned
//! to the caller after the post-dispatch hooks. Async subscriptions become
//! jobs on a bounded queue served by a fixed worker pool; a full queue drops
//! the job instead of slowing the publisher.
mod invoker;
mod queue;
mod system;
pub(crate) mod worker;
pub use invoker::*;
pub use queue::DispatchJob;
pub(crate) use queue::JobQueue;
pub(crate) use system::SystemEvents;

#[cfg(test)]
mod worker_test;

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;
use worker::invoke_bounded;
use worker::WorkerContext;

use crate::cache::Target;
use crate::cache::TargetCache;
use crate::plugin::HookContext;
use crate::plugin::PluginManager;
use crate::DeliveryMode;
use crate::DispatchError;
use crate::DispatchOutcome;
use crate::DispatchRequest;
use crate::Event;
use crate::FunctionResponse;
use crate::RouterConfig;
use crate::RouterMetrics;

/// Result of [`Router::drain`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// All accepted jobs finished before the deadline
    pub completed: bool,
    /// Jobs still queued or in flight when the deadline hit
    pub abandoned: u64,
}

pub struct Router {
    cache: Arc<TargetCache>,
    plugins: PluginManager,
    config: RouterConfig,
    ctx: Arc<WorkerContext>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl Router {
    pub fn new(
        cache: Arc<TargetCache>,
        plugins: PluginManager,
        invoker: Arc<dyn FunctionInvoker>,
        config: RouterConfig,
        metrics: RouterMetrics,
    ) -> Self {
        let (queue, receiver) = JobQueue::new(config.queue_capacity, metrics.dropped_events.clone());
        let queue = Arc::new(queue);
        let ctx = Arc::new(WorkerContext {
            receiver: tokio::sync::Mutex::new(receiver),
            queue: queue.clone(),
            system: SystemEvents::new(cache.clone(), queue),
            invoker,
            metrics,
            function_timeout: config.function_timeout(),
            cancel: CancellationToken::new(),
            in_flight: AtomicUsize::new(0),
            abandoned: AtomicU64::new(0),
        });

        Self {
            cache,
            plugins,
            config,
            ctx,
            workers: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    /// Spawns the worker pool. Calling it again has no effect.
    pub fn start_workers(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("dispatch workers already started");
            return;
        }
        let mut workers = self.workers.lock();
        for id in 0..self.config.workers {
            workers.push(tokio::spawn(worker::run(id, self.ctx.clone())));
        }
        info!(
            workers = self.config.workers,
            queue_capacity = self.config.queue_capacity,
            "dispatch workers started"
        );
    }

    /// Jobs waiting in the queue
    pub fn queued(&self) -> usize {
        self.ctx.queue.queued()
    }

    /// Jobs a worker is currently delivering
    pub fn in_flight(&self) -> usize {
        self.ctx.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_draining(&self) -> bool {
        self.ctx.queue.is_closed()
    }

    /// Routes one inbound event.
    ///
    /// `cancel` is the caller's cancellation signal; it bounds the sync call
    /// together with the function timeout.
    pub async fn dispatch(
        &self,
        request: DispatchRequest,
        cancel: &CancellationToken,
    ) -> Result<DispatchOutcome, DispatchError> {
        let started = Instant::now();
        let result = self.route(request, cancel).await;

        let outcome = match &result {
            Ok(DispatchOutcome::Response { .. }) => "ok",
            Ok(DispatchOutcome::Accepted { .. }) => "accepted",
            Err(e) => e.outcome(),
        };
        self.ctx.metrics.observe(outcome, started.elapsed());
        result
    }

    async fn route(
        &self,
        mut request: DispatchRequest,
        cancel: &CancellationToken,
    ) -> Result<DispatchOutcome, DispatchError> {
        if self.is_draining() {
            return Err(DispatchError::ShuttingDown);
        }
        request.event.validate()?;

        let snapshot = self.cache.snapshot();
        let matched = snapshot.match_subscriptions(&request.event.event_type, &request.path, &request.method);
        self.ctx.system.received(&request.event);

        let (sync_targets, async_targets): (Vec<Target>, Vec<Target>) = matched
            .into_iter()
            .partition(|t| t.subscription.mode == DeliveryMode::Sync);
        let sync_target = sync_targets.into_iter().next();

        if sync_target.is_none() && async_targets.is_empty() {
            if request.event.is_http_request() || snapshot.has_sync_endpoint(&request.path, &request.method) {
                return Err(DispatchError::NotFound {
                    method: request.method,
                    path: request.path,
                    event_type: request.event.event_type,
                });
            }
            debug!(
                event_type = %request.event.event_type,
                path = %request.path,
                "no subscribers, event discarded"
            );
            return Ok(DispatchOutcome::Accepted { queued: 0, dropped: 0 });
        }

        if let Some(target) = &sync_target {
            request.event = with_params(request.event, &target.params);
        }
        let targets: Vec<Target> = sync_target.iter().cloned().chain(async_targets.iter().cloned()).collect();
        let mut ctx = HookContext::new(request, targets);
        self.plugins.pre_dispatch(&mut ctx).await?;

        let (queued, dropped) = self.enqueue(async_targets, &ctx.event);

        let Some(target) = sync_target else {
            debug!(event_type = %ctx.event.event_type, queued, dropped, "async event accepted");
            return Ok(DispatchOutcome::Accepted { queued, dropped });
        };

        let response = self.call(&target, &ctx.event, cancel).await?;
        ctx.response = Some(response);
        self.plugins.post_dispatch(&mut ctx).await?;

        // A post-dispatch hook may drop the body entirely
        let response = ctx.response.take().unwrap_or_else(|| FunctionResponse::new(204, Bytes::new()));
        Ok(DispatchOutcome::Response {
            response,
            cors: target.subscription.cors.clone(),
        })
    }

    fn enqueue(
        &self,
        targets: Vec<Target>,
        event: &Event,
    ) -> (usize, usize) {
        let mut queued = 0;
        let mut dropped = 0;
        for target in targets {
            let event = with_params(event.clone(), &target.params);
            if self.ctx.queue.try_enqueue(DispatchJob::new(target, event)) {
                queued += 1;
            } else {
                dropped += 1;
            }
        }
        (queued, dropped)
    }

    async fn call(
        &self,
        target: &Target,
        event: &Event,
        cancel: &CancellationToken,
    ) -> Result<FunctionResponse, DispatchError> {
        debug!(function_id = %target.function.function_id, "sync dispatch");
        self.ctx.system.invoking(target, event);

        let result = invoke_bounded(
            self.ctx.invoker.as_ref(),
            &target.function,
            event,
            self.ctx.function_timeout,
            cancel,
        )
        .await;

        match &result {
            Ok(response) => self.ctx.system.invoked(target, event, response),
            Err(e) => {
                warn!(function_id = %target.function.function_id, error = %e, "sync dispatch failed");
                self.ctx.system.invocation_failed(target, event, &e.to_string());
            }
        }
        result
    }

    /// Closes the queue and waits for queued and in-flight jobs, up to the
    /// drain timeout. Whatever is left at the deadline is abandoned and
    /// counted. Later calls return immediately.
    pub async fn drain(&self) -> DrainReport {
        if !self.ctx.queue.close() {
            return DrainReport {
                completed: true,
                abandoned: 0,
            };
        }
        info!(
            queued = self.queued(),
            in_flight = self.in_flight(),
            "draining dispatch queue"
        );

        let handles = std::mem::take(&mut *self.workers.lock());
        let all = join_all(handles);
        tokio::pin!(all);

        let drain_timeout = self.config.drain_timeout();
        let completed = match timeout(drain_timeout, &mut all).await {
            Ok(_) => true,
            Err(_) => {
                warn!(?drain_timeout, "drain deadline reached, abandoning remaining jobs");
                self.ctx.cancel.cancel();
                all.await;
                false
            }
        };

        let mut abandoned = self.ctx.abandoned.load(Ordering::SeqCst);
        {
            let mut receiver = self.ctx.receiver.lock().await;
            while receiver.try_recv().is_ok() {
                self.ctx.queue.dequeued();
                abandoned += 1;
            }
        }

        if abandoned > 0 {
            self.ctx.metrics.abandoned_jobs.inc_by(abandoned);
            warn!(abandoned, "jobs abandoned during drain");
        }
        info!(completed = completed && abandoned == 0, "dispatch queue drained");
        DrainReport {
            completed: completed && abandoned == 0,
            abandoned,
        }
    }
}

/// Copies captured path params into an `http.request` event's data.
fn with_params(
    mut event: Event,
    params: &BTreeMap<String, String>,
) -> Event {
    if params.is_empty() || !event.is_http_request() {
        return event;
    }
    if let Value::Object(data) = &mut event.data {
        let params = params
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        data.insert("params".to_string(), Value::Object(params));
    }
    event
}
