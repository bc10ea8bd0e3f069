use std::collections::BTreeMap;

use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::constants::CLOUDEVENTS_CONTENT_TYPE;
use crate::constants::EVENT_TYPE_HEADER;
use crate::constants::EVENT_TYPE_HTTP_REQUEST;
use crate::constants::JSON_CONTENT_TYPE;
use crate::utils::time::get_now_as_millis;
use crate::DispatchError;

/// CloudEvents-shaped event flowing through the router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_type: String,
    #[serde(default = "new_event_id")]
    pub event_id: String,
    #[serde(default)]
    pub source: String,
    /// Milliseconds since the unix epoch
    #[serde(default = "get_now_as_millis")]
    pub event_time: u64,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, Value>,
}

impl Event {
    pub fn new(
        event_type: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            event_id: new_event_id(),
            source: String::new(),
            event_time: get_now_as_millis(),
            content_type: JSON_CONTENT_TYPE.to_string(),
            data,
            extensions: BTreeMap::new(),
        }
    }

    pub fn with_source(
        mut self,
        source: impl Into<String>,
    ) -> Self {
        self.source = source.into();
        self
    }

    /// Envelope check performed when an event enters the router.
    pub fn validate(&self) -> std::result::Result<(), DispatchError> {
        if self.event_type.trim().is_empty() {
            return Err(DispatchError::BadRequest("event type is required".into()));
        }
        if self.event_id.trim().is_empty() {
            return Err(DispatchError::BadRequest("event id is required".into()));
        }
        Ok(())
    }

    pub fn is_http_request(&self) -> bool {
        self.event_type == EVENT_TYPE_HTTP_REQUEST
    }

    /// Builds an event from a raw HTTP call.
    ///
    /// A `application/cloudevents+json` body is parsed as a full envelope, an
    /// `Event` header names a custom event carrying the body as data, and any
    /// other call is wrapped as an `http.request` event.
    pub fn from_http(
        path: &str,
        method: &str,
        headers: &BTreeMap<String, String>,
        query: BTreeMap<String, String>,
        body: &Bytes,
    ) -> std::result::Result<Self, DispatchError> {
        let content_type = header(headers, "content-type").unwrap_or_default().to_ascii_lowercase();

        if content_type.starts_with(CLOUDEVENTS_CONTENT_TYPE) {
            let event: Event = serde_json::from_slice(body)
                .map_err(|e| DispatchError::BadRequest(format!("invalid CloudEvents payload: {}", e)))?;
            event.validate()?;
            return Ok(event);
        }

        if let Some(event_type) = header(headers, EVENT_TYPE_HEADER) {
            if event_type.trim().is_empty() {
                return Err(DispatchError::BadRequest("empty Event header".into()));
            }
            let mut event = Event::new(event_type, body_value(body));
            event.content_type = content_type;
            return Ok(event);
        }

        let data = HttpRequestData {
            path: path.to_string(),
            method: method.to_ascii_uppercase(),
            headers: headers.clone(),
            query,
            params: BTreeMap::new(),
            body: body_value(body),
        };
        let mut event = Event::new(EVENT_TYPE_HTTP_REQUEST, data.into_value());
        event.content_type = JSON_CONTENT_TYPE.to_string();
        Ok(event)
    }
}

/// Data payload of an `http.request` event
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HttpRequestData {
    pub path: String,
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Value,
}

impl HttpRequestData {
    pub fn into_value(self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// In-process handoff from the events API to the router
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub path: String,
    pub method: String,
    pub event: Event,
    /// Inbound headers, visible to plugins
    pub headers: BTreeMap<String, String>,
}

impl DispatchRequest {
    pub fn new(
        path: impl Into<String>,
        method: impl Into<String>,
        event: Event,
    ) -> Self {
        Self {
            path: path.into(),
            method: method.into().to_ascii_uppercase(),
            event,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_headers(
        mut self,
        headers: BTreeMap<String, String>,
    ) -> Self {
        self.headers = headers;
        self
    }
}

pub(crate) fn new_event_id() -> String {
    nanoid::nanoid!()
}

fn header<'a>(
    headers: &'a BTreeMap<String, String>,
    name: &str,
) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn body_value(body: &Bytes) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(body).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}
