use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::HookContext;
use super::HookOutcome;
use super::Plugin;
use super::PluginLoader;
use crate::PluginError;

type Factory = fn(Option<&str>) -> Result<Arc<dyn Plugin>, PluginError>;

/// Logs every event and response at debug level
#[derive(Debug, Default)]
pub struct LoggerPlugin;

#[async_trait]
impl Plugin for LoggerPlugin {
    fn name(&self) -> String {
        "logger".to_string()
    }

    async fn pre_dispatch(
        &self,
        ctx: &mut HookContext,
    ) -> Result<HookOutcome, PluginError> {
        debug!(
            event_type = %ctx.event.event_type,
            event_id = %ctx.event.event_id,
            path = %ctx.path,
            method = %ctx.method,
            targets = ctx.targets.len(),
            "event received"
        );
        Ok(HookOutcome::Continue)
    }

    async fn post_dispatch(
        &self,
        ctx: &mut HookContext,
    ) -> Result<HookOutcome, PluginError> {
        if let Some(response) = &ctx.response {
            debug!(event_id = %ctx.event.event_id, status = response.status, "function responded");
        }
        Ok(HookOutcome::Continue)
    }

    async fn kill(&self) {}
}

/// Rejects events of the listed types
#[derive(Debug)]
pub struct DenyPlugin {
    denied: BTreeSet<String>,
}

impl DenyPlugin {
    pub fn new(denied: impl IntoIterator<Item = String>) -> Self {
        Self {
            denied: denied.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Plugin for DenyPlugin {
    fn name(&self) -> String {
        "deny".to_string()
    }

    async fn pre_dispatch(
        &self,
        ctx: &mut HookContext,
    ) -> Result<HookOutcome, PluginError> {
        if self.denied.contains(&ctx.event.event_type) {
            return Ok(HookOutcome::Reject(format!(
                "event type {} is denied",
                ctx.event.event_type
            )));
        }
        Ok(HookOutcome::Continue)
    }

    async fn post_dispatch(
        &self,
        _ctx: &mut HookContext,
    ) -> Result<HookOutcome, PluginError> {
        Ok(HookOutcome::Continue)
    }

    async fn kill(&self) {}
}

/// Loader for the plugins compiled into the gateway.
///
/// A location is `name` or `name:args`, e.g. `logger` or
/// `deny:user.deleted,user.banned`.
pub struct BuiltinLoader {
    factories: HashMap<&'static str, Factory>,
}

impl Default for BuiltinLoader {
    fn default() -> Self {
        let mut factories: HashMap<&'static str, Factory> = HashMap::new();
        factories.insert("logger", |_| Ok(Arc::new(LoggerPlugin) as Arc<dyn Plugin>));
        factories.insert("deny", |args| {
            let types: Vec<String> = args
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
            if types.is_empty() {
                return Err(PluginError::LoadFailed {
                    location: "deny".to_string(),
                    reason: "no event types given".to_string(),
                });
            }
            Ok(Arc::new(DenyPlugin::new(types)) as Arc<dyn Plugin>)
        });
        Self { factories }
    }
}

impl BuiltinLoader {
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[async_trait]
impl PluginLoader for BuiltinLoader {
    async fn load(
        &self,
        location: &str,
    ) -> Result<Arc<dyn Plugin>, PluginError> {
        let (name, args) = match location.split_once(':') {
            Some((name, args)) => (name.trim(), Some(args)),
            None => (location.trim(), None),
        };

        let factory = self.factories.get(name).ok_or_else(|| PluginError::LoadFailed {
            location: location.to_string(),
            reason: format!("unknown plugin, available: {}", self.names().join(", ")),
        })?;
        factory(args)
    }
}
