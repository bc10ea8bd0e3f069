use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// A single HTTP listener (events API or configuration API)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ListenerConfig {
    /// Socket address the listener binds to
    pub listen_address: SocketAddr,

    /// PEM certificate; TLS is enabled when both cert and key are set
    #[serde(default)]
    pub tls_cert_path: Option<String>,

    /// PEM private key
    #[serde(default)]
    pub tls_key_path: Option<String>,
}

impl ListenerConfig {
    pub fn tls_enabled(&self) -> bool {
        self.tls_cert_path.is_some() && self.tls_key_path.is_some()
    }

    /// URL scheme used when logging the listener address
    pub fn scheme(&self) -> &'static str {
        if self.tls_enabled() {
            "https"
        } else {
            "http"
        }
    }

    /// Validates listener configuration
    /// # Errors
    /// Returns `Error::InvalidConfig` when:
    /// - only one of certificate and key is configured
    /// - a configured TLS file does not exist
    pub fn validate(
        &self,
        name: &str,
    ) -> Result<()> {
        match (&self.tls_cert_path, &self.tls_key_path) {
            (Some(cert), Some(key)) => {
                for path in [cert, key] {
                    if !Path::new(path).exists() {
                        return Err(Error::InvalidConfig(format!(
                            "{} TLS file {} does not exist",
                            name, path
                        )));
                    }
                }
                Ok(())
            }
            (None, None) => Ok(()),
            _ => Err(Error::InvalidConfig(format!(
                "{} TLS requires both tls_cert_path and tls_key_path",
                name
            ))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ApiConfig {
    /// Inbound events (publish and direct invocation)
    #[serde(default = "default_events_listener")]
    pub events: ListenerConfig,

    /// Function and subscription management
    #[serde(default = "default_config_listener")]
    pub config: ListenerConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            events: default_events_listener(),
            config: default_config_listener(),
        }
    }
}

impl ApiConfig {
    pub fn validate(&self) -> Result<()> {
        self.events.validate("events API")?;
        self.config.validate("config API")?;

        if self.events.listen_address.port() == self.config.listen_address.port() {
            return Err(Error::InvalidConfig(format!(
                "events API and config API cannot share port {}",
                self.events.listen_address.port()
            )));
        }
        Ok(())
    }
}

fn default_events_listener() -> ListenerConfig {
    ListenerConfig {
        listen_address: SocketAddr::from(([0, 0, 0, 0], 4000)),
        tls_cert_path: None,
        tls_key_path: None,
    }
}

fn default_config_listener() -> ListenerConfig {
    ListenerConfig {
        listen_address: SocketAddr::from(([0, 0, 0, 0], 4001)),
        tls_cert_path: None,
        tls_key_path: None,
    }
}
