//! Async dispatch workers.
//!
//! A fixed number of workers share the receiving end of the job queue. Each
//! takes one job at a time, calls the target with the configured timeout and
//! records the result. Failed deliveries are logged and counted, never
//! retried. Workers exit when the queue is closed and empty, or when the
//! drain deadline cancels them.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::warn;

use super::DispatchJob;
use super::FunctionInvoker;
use super::JobQueue;
use super::SystemEvents;
use crate::DispatchError;
use crate::Event;
use crate::Function;
use crate::FunctionResponse;
use crate::InvokeError;
use crate::RouterMetrics;

/// State shared by the router and its workers
pub(crate) struct WorkerContext {
    pub(crate) receiver: Mutex<mpsc::Receiver<DispatchJob>>,
    pub(crate) queue: Arc<JobQueue>,
    pub(crate) system: SystemEvents,
    pub(crate) invoker: Arc<dyn FunctionInvoker>,
    pub(crate) metrics: RouterMetrics,
    pub(crate) function_timeout: Duration,
    /// Cancelled at the drain deadline
    pub(crate) cancel: CancellationToken,
    pub(crate) in_flight: AtomicUsize,
    pub(crate) abandoned: AtomicU64,
}

pub(crate) async fn run(
    id: usize,
    ctx: Arc<WorkerContext>,
) {
    debug!(worker = id, "dispatch worker started");
    loop {
        let job = {
            let mut receiver = ctx.receiver.lock().await;
            tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => None,
                job = receiver.recv() => job,
            }
        };
        let Some(job) = job else {
            debug!(worker = id, "dispatch worker stopped");
            return;
        };

        ctx.queue.dequeued();
        ctx.in_flight.fetch_add(1, Ordering::SeqCst);
        deliver(id, &ctx, job).await;
        ctx.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn deliver(
    id: usize,
    ctx: &WorkerContext,
    job: DispatchJob,
) {
    let DispatchJob {
        target,
        event,
        enqueued_at,
    } = job;
    let function_id = target.function.function_id.as_str();
    debug!(
        worker = id,
        function_id,
        event_type = %event.event_type,
        waited = ?enqueued_at.elapsed(),
        "delivering async event"
    );

    ctx.system.invoking(&target, &event);
    match invoke_bounded(ctx.invoker.as_ref(), &target.function, &event, ctx.function_timeout, &ctx.cancel).await {
        Ok(response) if response.is_success() => {
            debug!(worker = id, function_id, status = response.status, "async delivery succeeded");
            ctx.system.invoked(&target, &event, &response);
        }
        Ok(response) => {
            error!(worker = id, function_id, status = response.status, "async delivery rejected by function");
            ctx.metrics.delivery_failures.inc();
            ctx.system
                .invocation_failed(&target, &event, &format!("function answered {}", response.status));
        }
        Err(DispatchError::Cancelled) => {
            warn!(worker = id, function_id, "in-flight job abandoned at drain deadline");
            ctx.abandoned.fetch_add(1, Ordering::SeqCst);
        }
        Err(e) => {
            error!(worker = id, function_id, error = %e, "async delivery failed");
            ctx.metrics.delivery_failures.inc();
            ctx.system.invocation_failed(&target, &event, &e.to_string());
        }
    }
}

/// One function call bounded by `limit` and by `cancel`.
pub(crate) async fn invoke_bounded(
    invoker: &dyn FunctionInvoker,
    function: &Function,
    event: &Event,
    limit: Duration,
    cancel: &CancellationToken,
) -> Result<FunctionResponse, DispatchError> {
    let started = Instant::now();
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(DispatchError::Cancelled),
        result = timeout(limit, invoker.invoke(function, event)) => result,
    };

    match result {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(InvokeError::Timeout(elapsed))) => Err(DispatchError::Timeout {
            function_id: function.function_id.clone(),
            elapsed,
        }),
        Ok(Err(e)) => Err(DispatchError::TargetFailure {
            function_id: function.function_id.clone(),
            reason: e.to_string(),
        }),
        Err(_) => Err(DispatchError::Timeout {
            function_id: function.function_id.clone(),
            elapsed: started.elapsed(),
        }),
    }
}
