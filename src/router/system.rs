use std::sync::Arc;

use serde_json::json;
use serde_json::Value;
use tracing::trace;

use super::DispatchJob;
use super::JobQueue;
use crate::cache::Target;
use crate::cache::TargetCache;
use crate::constants::SYSTEM_EVENT_METHOD;
use crate::constants::SYSTEM_EVENT_PATH;
use crate::constants::SYSTEM_EVENT_RECEIVED;
use crate::constants::SYSTEM_EVENT_SOURCE;
use crate::constants::SYSTEM_FUNCTION_INVOCATION_FAILED;
use crate::constants::SYSTEM_FUNCTION_INVOKED;
use crate::constants::SYSTEM_FUNCTION_INVOKING;
use crate::Event;
use crate::FunctionResponse;

/// Publishes the gateway's own lifecycle events to async subscribers of
/// `POST /`. Events that are themselves system events publish nothing.
#[derive(Clone)]
pub(crate) struct SystemEvents {
    cache: Arc<TargetCache>,
    queue: Arc<JobQueue>,
}

impl SystemEvents {
    pub(crate) fn new(
        cache: Arc<TargetCache>,
        queue: Arc<JobQueue>,
    ) -> Self {
        Self { cache, queue }
    }

    pub(crate) fn is_system(event: &Event) -> bool {
        event.source == SYSTEM_EVENT_SOURCE
    }

    pub(crate) fn received(
        &self,
        event: &Event,
    ) {
        if Self::is_system(event) {
            return;
        }
        self.publish(SYSTEM_EVENT_RECEIVED, || json!({ "event": event }));
    }

    pub(crate) fn invoking(
        &self,
        target: &Target,
        event: &Event,
    ) {
        if Self::is_system(event) {
            return;
        }
        self.publish(SYSTEM_FUNCTION_INVOKING, || {
            json!({
                "space": target.function.space,
                "functionId": target.function.function_id,
                "event": event,
            })
        });
    }

    pub(crate) fn invoked(
        &self,
        target: &Target,
        event: &Event,
        response: &FunctionResponse,
    ) {
        if Self::is_system(event) {
            return;
        }
        self.publish(SYSTEM_FUNCTION_INVOKED, || {
            json!({
                "space": target.function.space,
                "functionId": target.function.function_id,
                "event": event,
                "status": response.status,
            })
        });
    }

    pub(crate) fn invocation_failed(
        &self,
        target: &Target,
        event: &Event,
        error: &str,
    ) {
        if Self::is_system(event) {
            return;
        }
        self.publish(SYSTEM_FUNCTION_INVOCATION_FAILED, || {
            json!({
                "space": target.function.space,
                "functionId": target.function.function_id,
                "event": event,
                "error": error,
            })
        });
    }

    fn publish(
        &self,
        event_type: &str,
        data: impl FnOnce() -> Value,
    ) {
        let targets = self
            .cache
            .async_targets(event_type, SYSTEM_EVENT_PATH, SYSTEM_EVENT_METHOD);
        if targets.is_empty() {
            return;
        }

        let event = Event::new(event_type, data()).with_source(SYSTEM_EVENT_SOURCE);
        trace!(event_type, subscribers = targets.len(), "publish system event");
        for target in targets {
            self.queue.try_enqueue(DispatchJob::new(target, event.clone()));
        }
    }
}
