//! Configuration service
//!
//! Backs the configuration API. Every read goes to the store with
//! linearizable consistency instead of the target cache, so a client that
//! just wrote an entry always reads it back. Writes are compare-and-swap on
//! the revision observed by the preceding read.
mod config_service;
pub use config_service::*;
