//! Serverless event gateway.
//!
//! Inbound events are matched against a watch-synchronized cache of
//! functions and subscriptions, run through a plugin pipeline and delivered
//! either inline (sync subscriptions) or through a bounded worker pool
//! (async subscriptions). Routing configuration lives in a namespaced
//! key-value store and is managed through the configuration API.
pub mod api;
pub mod cache;
mod config;
pub(crate) mod constants;
mod errors;
mod metrics;
mod model;
pub mod plugin;
pub mod router;
pub mod service;
mod shutdown;
pub mod store;
mod utils;

pub use config::*;
pub use errors::*;
pub use metrics::*;
pub use model::*;
pub use shutdown::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
