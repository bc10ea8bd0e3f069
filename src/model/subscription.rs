use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use super::default_space;
use super::validate_id;
use crate::constants::DEFAULT_METHOD;
use crate::constants::EVENT_TYPE_WILDCARD;
use crate::RegistryError;

/// Delivery mode of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Caller blocks for the function's response; at most one target
    Sync,
    /// Fire-and-forget; any number of subscriptions may match
    Async,
}

impl fmt::Display for DeliveryMode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            DeliveryMode::Sync => write!(f, "sync"),
            DeliveryMode::Async => write!(f, "async"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionKey {
    pub space: String,
    pub subscription_id: String,
}

impl SubscriptionKey {
    pub fn new(
        space: impl Into<String>,
        subscription_id: impl Into<String>,
    ) -> Self {
        Self {
            space: space.into(),
            subscription_id: subscription_id.into(),
        }
    }
}

/// CORS settings carried verbatim to the events API
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cors {
    #[serde(default)]
    pub origins: Vec<String>,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub allow_credentials: bool,
}

/// Binding from an event matcher to one function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    #[serde(default = "default_space")]
    pub space: String,
    /// Derived from the matcher and target, see [`Subscription::derive_id`]
    #[serde(default)]
    pub subscription_id: String,
    #[serde(rename = "type")]
    pub mode: DeliveryMode,
    pub event_type: String,
    pub function_id: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cors: Option<Cors>,
}

impl Subscription {
    pub fn new(
        mode: DeliveryMode,
        event_type: impl Into<String>,
        function_id: impl Into<String>,
        path: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        let mut subscription = Self {
            space: default_space(),
            subscription_id: String::new(),
            mode,
            event_type: event_type.into(),
            function_id: function_id.into(),
            path: path.into(),
            method: method.into(),
            cors: None,
        };
        subscription.normalize();
        subscription
    }

    pub fn in_space(
        mut self,
        space: impl Into<String>,
    ) -> Self {
        self.space = space.into();
        self
    }

    pub fn key(&self) -> SubscriptionKey {
        SubscriptionKey::new(self.space.clone(), self.subscription_id.clone())
    }

    /// Deterministic id: identical matcher + target always yields the same id.
    pub fn derive_id(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.mode,
            self.event_type,
            self.function_id,
            self.path.replace('%', "%25").replace('/', "%2F"),
            self.method
        )
    }

    /// Upper-cases the method, fills default path and recomputes the id.
    pub fn normalize(&mut self) {
        self.method = self.method.trim().to_ascii_uppercase();
        if self.method.is_empty() {
            self.method = DEFAULT_METHOD.to_string();
        }
        if self.path.is_empty() {
            self.path = default_path();
        }
        self.subscription_id = self.derive_id();
    }

    pub fn is_wildcard_type(&self) -> bool {
        self.event_type == EVENT_TYPE_WILDCARD
    }

    pub fn validate(&self) -> std::result::Result<(), RegistryError> {
        validate_id("space", &self.space)?;
        validate_id("functionId", &self.function_id)?;

        if self.event_type.is_empty()
            || self.event_type.chars().any(|c| c.is_whitespace() || c == '/')
        {
            return Err(RegistryError::Validation(format!(
                "eventType {:?} must be non-empty without whitespace or '/'",
                self.event_type
            )));
        }
        if !self.method.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(RegistryError::Validation(format!(
                "method {:?} is not a valid HTTP method",
                self.method
            )));
        }
        crate::cache::PathPattern::parse(&self.path).map_err(RegistryError::Validation)?;
        Ok(())
    }
}

fn default_path() -> String {
    "/".to_string()
}

fn default_method() -> String {
    DEFAULT_METHOD.to_string()
}
