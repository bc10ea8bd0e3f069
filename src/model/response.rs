use std::collections::BTreeMap;

use bytes::Bytes;

use super::Cors;

/// Response of a function, returned verbatim to a sync caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl FunctionResponse {
    pub fn new(
        status: u16,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Result of a successful `Router::dispatch`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Sync delivery finished; CORS settings of the matched subscription ride along
    Response {
        response: FunctionResponse,
        cors: Option<Cors>,
    },
    /// Async publish acknowledged, independent of delivery
    Accepted { queued: usize, dropped: usize },
}
