use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tracing::trace;

use crate::constants::JSON_CONTENT_TYPE;
use crate::Error;
use crate::Event;
use crate::Function;
use crate::FunctionResponse;
use crate::InvokeError;
use crate::Provider;
use crate::Result;

/// Outbound call to the compute behind a function.
///
/// Non-2xx answers are responses, not errors: a sync caller receives them
/// verbatim. Errors mean no answer was obtained at all.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FunctionInvoker: Send + Sync + 'static {
    async fn invoke(
        &self,
        function: &Function,
        event: &Event,
    ) -> std::result::Result<FunctionResponse, InvokeError>;
}

/// Invokes `http` providers by POSTing the JSON event to their URL
#[derive(Debug, Clone)]
pub struct HttpInvoker {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpInvoker {
    /// `timeout` bounds each call at the transport level.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Fatal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, timeout })
    }

    fn transport_error(
        &self,
        e: reqwest::Error,
    ) -> InvokeError {
        if e.is_timeout() {
            InvokeError::Timeout(self.timeout)
        } else {
            InvokeError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl FunctionInvoker for HttpInvoker {
    async fn invoke(
        &self,
        function: &Function,
        event: &Event,
    ) -> std::result::Result<FunctionResponse, InvokeError> {
        let Provider::Http { url, headers } = &function.provider;
        let url = reqwest::Url::parse(url).map_err(|e| InvokeError::InvalidEndpoint(format!("{}: {}", url, e)))?;

        let mut request = self.client.post(url).header("Content-Type", JSON_CONTENT_TYPE);
        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request
            .json(event)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response.bytes().await.map_err(|e| self.transport_error(e))?;

        trace!(function_id = %function.function_id, status, "function answered");
        Ok(FunctionResponse { status, headers, body })
    }
}
