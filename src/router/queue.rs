use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use parking_lot::RwLock;
use prometheus::IntCounter;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tracing::warn;

use crate::cache::Target;
use crate::Event;

/// One async delivery attempt
#[derive(Debug)]
pub struct DispatchJob {
    pub target: Target,
    pub event: Event,
    pub enqueued_at: Instant,
}

impl DispatchJob {
    pub fn new(
        target: Target,
        event: Event,
    ) -> Self {
        Self {
            target,
            event,
            enqueued_at: Instant::now(),
        }
    }
}

/// Producer side of the bounded job queue.
///
/// Enqueueing never waits: a full or closed queue drops the job and counts
/// it once.
pub(crate) struct JobQueue {
    sender: RwLock<Option<mpsc::Sender<DispatchJob>>>,
    queued: AtomicUsize,
    dropped: IntCounter,
}

impl JobQueue {
    pub(crate) fn new(
        capacity: usize,
        dropped: IntCounter,
    ) -> (Self, mpsc::Receiver<DispatchJob>) {
        let (sender, receiver) = mpsc::channel(capacity);
        let queue = Self {
            sender: RwLock::new(Some(sender)),
            queued: AtomicUsize::new(0),
            dropped,
        };
        (queue, receiver)
    }

    pub(crate) fn try_enqueue(
        &self,
        job: DispatchJob,
    ) -> bool {
        let guard = self.sender.read();
        let Some(sender) = guard.as_ref() else {
            self.dropped.inc();
            warn!(function_id = %job.target.function.function_id, "job queue closed, event dropped");
            return false;
        };

        self.queued.fetch_add(1, Ordering::SeqCst);
        match sender.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                self.queued.fetch_sub(1, Ordering::SeqCst);
                self.dropped.inc();
                warn!(
                    function_id = %job.target.function.function_id,
                    event_type = %job.event.event_type,
                    "job queue full, event dropped"
                );
                false
            }
            Err(TrySendError::Closed(job)) => {
                self.queued.fetch_sub(1, Ordering::SeqCst);
                self.dropped.inc();
                warn!(function_id = %job.target.function.function_id, "job queue closed, event dropped");
                false
            }
        }
    }

    /// Called by a worker for every job it takes off the queue.
    pub(crate) fn dequeued(&self) {
        self.queued.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Refuses further jobs; workers finish what is queued and then see the
    /// end of the channel. Returns false if already closed.
    pub(crate) fn close(&self) -> bool {
        self.sender.write().take().is_some()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }
}
