use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tracing::error;

use crate::BackoffPolicy;
use crate::Result;

/// Spawns a fallible background task, logging its error on exit. The handle
/// is pushed to `handles` when given.
pub(crate) fn spawn_task<F, Fut>(
    name: &str,
    task_fn: F,
    handles: Option<&mut Vec<JoinHandle<()>>>,
) where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let name = name.to_string();
    let handle = tokio::spawn(async move {
        if let Err(e) = task_fn().await {
            error!("{name} stopped with error: {:?}", e);
        }
    });

    if let Some(h) = handles {
        h.push(handle);
    }
}

/// Exponential backoff delay for `attempt` plus up to 20% random jitter.
pub(crate) fn backoff_delay(
    policy: &BackoffPolicy,
    attempt: u32,
) -> Duration {
    let delay = policy.delay_for(attempt);
    let jitter_ms = (delay.as_millis() as u64) / 5;
    if jitter_ms == 0 {
        return delay;
    }
    let jitter = rand::thread_rng().gen_range(0..=jitter_ms);
    delay + Duration::from_millis(jitter)
}
