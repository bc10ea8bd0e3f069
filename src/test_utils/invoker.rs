use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::router::FunctionInvoker;
use crate::Event;
use crate::Function;
use crate::FunctionResponse;
use crate::InvokeError;

/// A call seen by [`RecordingInvoker`]
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub function_id: String,
    pub event: Event,
}

/// Invoker answering every call with a fixed status after an optional
/// delay, remembering what it was asked to do.
pub struct RecordingInvoker {
    status: u16,
    delay: Duration,
    calls: Mutex<Vec<RecordedCall>>,
}

impl RecordingInvoker {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(
        mut self,
        delay: Duration,
    ) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn called_functions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.calls.lock().iter().map(|c| c.function_id.clone()).collect();
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
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.calls.lock().push(RecordedCall {
            function_id: function.function_id.clone(),
            event: event.clone(),
        });
        Ok(FunctionResponse::new(
            self.status,
            format!("{} handled {}", function.function_id, event.event_type),
        ))
    }
}
