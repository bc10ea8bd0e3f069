// -
// Config store key space

/// Namespace every gateway key lives under unless configured otherwise
pub(crate) const DEFAULT_KEY_PREFIX: &str = "/serverless-event-gateway";

/// Sub-namespaces below the prefix
pub(crate) const FUNCTIONS_DIR: &str = "functions";
pub(crate) const SUBSCRIPTIONS_DIR: &str = "subscriptions";

// -
// Data model defaults

pub const DEFAULT_SPACE: &str = "default";
pub const DEFAULT_METHOD: &str = "POST";

/// Matches any event type in a subscription
pub const EVENT_TYPE_WILDCARD: &str = "*";

/// Event type given to raw HTTP calls that carry no event envelope
pub const EVENT_TYPE_HTTP_REQUEST: &str = "http.request";

// -
// System events published by the router

pub const SYSTEM_EVENT_RECEIVED: &str = "gateway.event.received";
pub const SYSTEM_FUNCTION_INVOKING: &str = "gateway.function.invoking";
pub const SYSTEM_FUNCTION_INVOKED: &str = "gateway.function.invoked";
pub const SYSTEM_FUNCTION_INVOCATION_FAILED: &str = "gateway.function.invocationFailed";

/// Path and method system events are published on
pub(crate) const SYSTEM_EVENT_PATH: &str = "/";
pub(crate) const SYSTEM_EVENT_METHOD: &str = "POST";

pub(crate) const SYSTEM_EVENT_SOURCE: &str = "https://serverless.com/event-gateway";

// -
// Wire

pub(crate) const CLOUDEVENTS_CONTENT_TYPE: &str = "application/cloudevents+json";
pub(crate) const JSON_CONTENT_TYPE: &str = "application/json";
pub(crate) const EVENT_TYPE_HEADER: &str = "event";
