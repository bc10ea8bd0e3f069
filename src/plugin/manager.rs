use std::sync::Arc;

use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::HookContext;
use super::HookOutcome;
use super::Plugin;
use super::PluginLoader;
use crate::DispatchError;
use crate::Result;

#[derive(Debug, Clone, Copy)]
enum Phase {
    Pre,
    Post,
}

/// Registered plugins, run in registration order
#[derive(Clone, Default)]
pub struct PluginManager {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginManager {
    pub fn new(plugins: Vec<Arc<dyn Plugin>>) -> Self {
        Self { plugins }
    }

    /// Loads every location in order. Any failure aborts startup.
    pub async fn connect(
        locations: &[String],
        loader: &dyn PluginLoader,
    ) -> Result<Self> {
        let mut plugins = Vec::with_capacity(locations.len());
        for location in locations {
            let plugin = loader.load(location).await?;
            info!(location = %location, plugin = %plugin.name(), "plugin connected");
            plugins.push(plugin);
        }
        Ok(Self { plugins })
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub async fn pre_dispatch(
        &self,
        ctx: &mut HookContext,
    ) -> std::result::Result<(), DispatchError> {
        self.run(Phase::Pre, ctx).await
    }

    pub async fn post_dispatch(
        &self,
        ctx: &mut HookContext,
    ) -> std::result::Result<(), DispatchError> {
        self.run(Phase::Post, ctx).await
    }

    async fn run(
        &self,
        phase: Phase,
        ctx: &mut HookContext,
    ) -> std::result::Result<(), DispatchError> {
        for plugin in &self.plugins {
            let outcome = match phase {
                Phase::Pre => plugin.pre_dispatch(ctx).await,
                Phase::Post => plugin.post_dispatch(ctx).await,
            };

            match outcome {
                Ok(HookOutcome::Continue) => {
                    debug!(plugin = %plugin.name(), ?phase, "hook passed");
                }
                Ok(HookOutcome::Reject(reason)) => {
                    warn!(
                        plugin = %plugin.name(),
                        ?phase,
                        event_type = %ctx.event.event_type,
                        reason = %reason,
                        "event rejected by plugin"
                    );
                    return Err(DispatchError::Rejected {
                        plugin: plugin.name(),
                        reason,
                    });
                }
                Err(e) => {
                    error!(plugin = %plugin.name(), ?phase, error = %e, "plugin malfunction");
                    return Err(DispatchError::PluginFailure { plugin: plugin.name() });
                }
            }
        }
        Ok(())
    }

    /// Disconnects every plugin; called once at process exit.
    pub async fn kill(&self) {
        for plugin in &self.plugins {
            plugin.kill().await;
            info!(plugin = %plugin.name(), "plugin killed");
        }
    }
}
