//! Event Gateway Error Hierarchy
//!
//! Errors are grouped by the layer raising them: configuration loading, the
//! config store, the configuration-API registry, the plugin pipeline and the
//! dispatch path. Dispatch errors carry their own HTTP status mapping because
//! they are the only ones a publisher ever sees.

use std::time::Duration;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration source could not be read or deserialized
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configuration was read but failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Config store failures (unreachable, lagged watch, CAS conflicts)
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Inbound event could not be delivered
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Configuration-API rule violations
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Plugin loading or execution failures
    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Store cannot be reached
    #[error("Config store unavailable: {0}")]
    Unavailable(String),

    /// Watch consumer fell behind and notifications were lost
    #[error("Watch stream lagged, {skipped} notifications skipped")]
    WatchLagged { skipped: u64 },

    /// Compare-and-swap precondition did not hold
    #[error("Compare-and-swap conflict on {key}")]
    CasConflict { key: String },

    /// A stored value could not be decoded
    #[error("Failed to decode value at {key}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// Dispatch-path failures, one variant per row of the error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Inbound event envelope is malformed
    #[error("Malformed event: {0}")]
    BadRequest(String),

    /// No subscription matched a request that expects a response
    #[error("No subscription matches {method} {path} for event type {event_type}")]
    NotFound {
        method: String,
        path: String,
        event_type: String,
    },

    /// A plugin explicitly refused the event
    #[error("Rejected by plugin {plugin}: {reason}")]
    Rejected { plugin: String, reason: String },

    /// A plugin failed while handling the event
    #[error("Plugin {plugin} failed to process the event")]
    PluginFailure { plugin: String },

    /// Target function returned an error or could not be reached
    #[error("Function {function_id} invocation failed: {reason}")]
    TargetFailure { function_id: String, reason: String },

    /// Target function did not answer in time
    #[error("Function {function_id} timed out after {elapsed:?}")]
    Timeout {
        function_id: String,
        elapsed: Duration,
    },

    /// Caller went away before the target answered
    #[error("Request cancelled by caller")]
    Cancelled,

    /// Router is draining and accepts no more work
    #[error("Gateway is shutting down")]
    ShuttingDown,
}

impl DispatchError {
    /// HTTP status the events API answers with.
    pub fn status_code(&self) -> u16 {
        match self {
            DispatchError::BadRequest(_) => 400,
            DispatchError::Rejected { .. } => 403,
            DispatchError::NotFound { .. } => 404,
            DispatchError::PluginFailure { .. } => 500,
            DispatchError::TargetFailure { .. } => 502,
            DispatchError::ShuttingDown => 503,
            DispatchError::Timeout { .. } | DispatchError::Cancelled => 504,
        }
    }

    /// Label value used for the request duration histogram.
    pub fn outcome(&self) -> &'static str {
        match self {
            DispatchError::BadRequest(_) => "bad_request",
            DispatchError::NotFound { .. } => "not_found",
            DispatchError::Rejected { .. } | DispatchError::PluginFailure { .. } => "rejected",
            DispatchError::TargetFailure { .. } => "target_error",
            DispatchError::Timeout { .. } | DispatchError::Cancelled => "timeout",
            DispatchError::ShuttingDown => "shutting_down",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} {id} already exists")]
    AlreadyExists { kind: &'static str, id: String },

    /// Subscription points at a function that is not registered
    #[error("Function {0} not found")]
    FunctionNotFound(String),

    /// Function is still referenced by subscriptions
    #[error("Function {function_id} is used by {subscriptions} subscription(s)")]
    FunctionInUse {
        function_id: String,
        subscriptions: usize,
    },

    /// Another sync subscription already owns this endpoint
    #[error("Sync subscription for {method} {path} ({event_type}) already exists")]
    PathConflict {
        method: String,
        path: String,
        event_type: String,
    },
}

impl RegistryError {
    pub fn status_code(&self) -> u16 {
        match self {
            RegistryError::Validation(_) | RegistryError::FunctionNotFound(_) => 400,
            RegistryError::NotFound { .. } => 404,
            RegistryError::AlreadyExists { .. }
            | RegistryError::FunctionInUse { .. }
            | RegistryError::PathConflict { .. } => 409,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// Plugin location could not be resolved or connected
    #[error("Failed to load plugin {location}: {reason}")]
    LoadFailed { location: String, reason: String },

    /// Plugin misbehaved while running a hook
    #[error("Plugin {plugin} malfunction: {reason}")]
    Malfunction { plugin: String, reason: String },
}

/// Outbound function call failures.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("Invalid function endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invocation timed out after {0:?}")]
    Timeout(Duration),
}

impl Error {
    /// HTTP status for errors that reach an API caller.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Dispatch(e) => e.status_code(),
            Error::Registry(e) => e.status_code(),
            Error::Store(StoreError::CasConflict { .. }) => 409,
            Error::Store(StoreError::Unavailable(_)) => 503,
            _ => 500,
        }
    }
}
