use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    #[default]
    Json,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogConfig {
    /// Default filter when `RUST_LOG` is unset: debug, info, warn or error
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Write logs to `<dir>/event-gateway.log` instead of stderr
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            dir: None,
        }
    }
}

impl LogConfig {
    pub fn validate(&self) -> Result<()> {
        match self.level.as_str() {
            "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(Error::InvalidConfig(format!(
                "log.level {:?} is not one of debug, info, warn, error",
                other
            ))),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
