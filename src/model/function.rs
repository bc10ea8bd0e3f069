use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use super::default_space;
use super::validate_id;
use crate::RegistryError;

/// Identity of a function inside the gateway: unique per space
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionKey {
    pub space: String,
    pub function_id: String,
}

impl FunctionKey {
    pub fn new(
        space: impl Into<String>,
        function_id: impl Into<String>,
    ) -> Self {
        Self {
            space: space.into(),
            function_id: function_id.into(),
        }
    }
}

impl fmt::Display for FunctionKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}/{}", self.space, self.function_id)
    }
}

/// How the gateway reaches the compute backing a function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Provider {
    /// Plain HTTP endpoint; `headers` are sent with every call (e.g. auth)
    Http {
        url: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        headers: BTreeMap<String, String>,
    },
}

/// A registered invocation target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Function {
    #[serde(default = "default_space")]
    pub space: String,
    pub function_id: String,
    pub provider: Provider,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Function {
    pub fn http(
        space: impl Into<String>,
        function_id: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            space: space.into(),
            function_id: function_id.into(),
            provider: Provider::Http {
                url: url.into(),
                headers: BTreeMap::new(),
            },
            metadata: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> FunctionKey {
        FunctionKey::new(self.space.clone(), self.function_id.clone())
    }

    pub fn validate(&self) -> std::result::Result<(), RegistryError> {
        validate_id("space", &self.space)?;
        validate_id("functionId", &self.function_id)?;

        match &self.provider {
            Provider::Http { url, .. } => {
                let host = url
                    .strip_prefix("http://")
                    .or_else(|| url.strip_prefix("https://"))
                    .ok_or_else(|| {
                        RegistryError::Validation(format!("provider url {:?} must use http or https", url))
                    })?;
                if host.is_empty() || host.starts_with('/') {
                    return Err(RegistryError::Validation(format!("provider url {:?} has no host", url)));
                }
            }
        }
        Ok(())
    }
}
