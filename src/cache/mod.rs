//! Target cache: the watch-synchronized, in-memory routing view.
mod maintainer;
mod path;
mod snapshot;
mod target_cache;
pub use maintainer::*;
pub use path::*;
pub use snapshot::*;
pub use target_cache::*;

#[cfg(test)]
mod snapshot_test;
#[cfg(test)]
mod target_cache_test;
