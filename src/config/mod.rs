//! Configuration management for the event gateway.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
//! - Component-wise validation
mod api;
mod cache;
mod log;
mod monitoring;
mod retry;
mod router;
pub use api::*;
pub use cache::*;
pub use log::*;
pub use monitoring::*;
pub use retry::*;
pub use router::*;


use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

const ENV_PREFIX: &str = "EVENT_GATEWAY";

/// Plugin locations handed to the plugin loader at startup.
///
/// `EVENT_GATEWAY__PLUGINS__LOCATIONS` separates locations with `;` because
/// a single location may itself contain commas (`deny:a,b`).
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct PluginConfig {
    #[serde(default)]
    pub locations: Vec<String>,
}

/// Main configuration container for the gateway components
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct GatewayConfig {
    /// Events API and configuration API listeners
    #[serde(default)]
    pub api: ApiConfig,
    /// Dispatch engine and worker pool
    #[serde(default)]
    pub router: RouterConfig,
    /// Target cache namespace and watch policy
    #[serde(default)]
    pub cache: CacheConfig,
    /// Config store backend
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub plugins: PluginConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl GatewayConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `EVENT_GATEWAY__` prefix (highest priority)
    ///
    /// # Note
    /// Callers MUST call `validate()` before using the configuration.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("EVENT_GATEWAY__ROUTER__WORKERS", "50");
    /// let cfg = GatewayConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(Self::environment());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(Self::environment())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns validated instance.
    ///
    /// # Errors
    /// Returns validation errors from any subsystem:
    /// - Missing TLS files or half-configured TLS
    /// - Conflicting listener ports
    /// - Empty worker pool or queue
    /// - Malformed key prefix
    pub fn validate(self) -> Result<Self> {
        self.api.validate()?;
        self.router.validate()?;
        self.cache.validate()?;
        self.store.validate()?;
        self.monitoring.validate(&self.api)?;
        self.log.validate()?;
        Ok(self)
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .ignore_empty(true)
            .try_parsing(true)
            .list_separator(";")
            .with_list_parse_key("plugins.locations")
    }
}
