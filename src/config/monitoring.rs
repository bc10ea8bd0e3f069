use serde::Deserialize;
use serde::Serialize;

use super::ApiConfig;
use crate::Error;
use crate::Result;

/// Prometheus exporter serving `/metrics`
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitoringConfig {
    #[serde(default = "default_prometheus_enabled")]
    pub prometheus_enabled: bool,

    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            prometheus_enabled: default_prometheus_enabled(),
            prometheus_port: default_prometheus_port(),
        }
    }
}

impl MonitoringConfig {
    /// # Errors
    /// Returns `Error::InvalidConfig` when the exporter is enabled and its
    /// port is 0, privileged, or taken by one of the API listeners.
    pub fn validate(
        &self,
        api: &ApiConfig,
    ) -> Result<()> {
        if !self.prometheus_enabled {
            if self.prometheus_port != default_prometheus_port() {
                tracing::warn!(
                    "prometheus_port configured to {} but the exporter is disabled",
                    self.prometheus_port
                );
            }
            return Ok(());
        }

        if self.prometheus_port == 0 {
            return Err(Error::InvalidConfig("prometheus_port cannot be 0 when enabled".into()));
        }
        if self.prometheus_port < 1024 {
            return Err(Error::InvalidConfig(format!(
                "prometheus_port {} is a privileged port (requires root)",
                self.prometheus_port
            )));
        }
        for (name, listener) in [("events API", &api.events), ("config API", &api.config)] {
            if listener.listen_address.port() == self.prometheus_port {
                return Err(Error::InvalidConfig(format!(
                    "prometheus_port {} is already used by the {}",
                    self.prometheus_port, name
                )));
            }
        }
        Ok(())
    }
}

fn default_prometheus_enabled() -> bool {
    true
}

fn default_prometheus_port() -> u16 {
    4002
}
