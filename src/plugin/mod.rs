//! Plugin pipeline
//!
//! Plugins observe and influence dispatch through two hook points. Each hook
//! answers with a [`HookOutcome`]; an `Err` is a malfunction and stops the
//! phase like a rejection does, with a generic error for the caller.
//!
//! Plugins are obtained from a [`PluginLoader`] at startup; an empty
//! [`PluginManager`] turns every phase into a no-op.
mod builtin;
mod manager;
pub use builtin::*;
pub use manager::*;


use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::cache::Target;
use crate::DispatchRequest;
use crate::Event;
use crate::FunctionResponse;
use crate::PluginError;

/// Answer of a single hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    Continue,
    /// Abort the dispatch; the reason is reported to the caller
    Reject(String),
}

/// State shared by the hooks of one dispatch.
///
/// Pre-dispatch hooks may rewrite `event`; post-dispatch hooks may rewrite
/// `response`.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub path: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub event: Event,
    pub targets: Vec<Target>,
    /// Set for the post-dispatch phase only
    pub response: Option<FunctionResponse>,
}

impl HookContext {
    pub fn new(
        request: DispatchRequest,
        targets: Vec<Target>,
    ) -> Self {
        Self {
            path: request.path,
            method: request.method,
            headers: request.headers,
            event: request.event,
            targets,
            response: None,
        }
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    fn name(&self) -> String;

    /// Runs after matching, before any target is called.
    async fn pre_dispatch(
        &self,
        ctx: &mut HookContext,
    ) -> Result<HookOutcome, PluginError>;

    /// Runs after a sync target answered.
    async fn post_dispatch(
        &self,
        ctx: &mut HookContext,
    ) -> Result<HookOutcome, PluginError>;

    /// Releases the plugin's connection or process.
    async fn kill(&self);
}

/// Resolves a configured plugin location to a connected plugin
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PluginLoader: Send + Sync {
    async fn load(
        &self,
        location: &str,
    ) -> Result<Arc<dyn Plugin>, PluginError>;
}
