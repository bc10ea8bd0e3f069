//! Config store capability
//!
//! The gateway never talks to a concrete database directly; it consumes a
//! namespaced, revisioned key space through [`KvStore`]. Every mutation bumps
//! a store-wide revision, entries remember the revision they were created at
//! and last modified at, and a watch yields one notification per mutation
//! under a prefix. Watch streams are allowed to end or report a gap at any
//! time; consumers are expected to resynchronize with `list`.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::StoreError;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Stream of change notifications; an `Err` item means the stream is no
/// longer gap-free and must be reopened.
pub type WatchStream = BoxStream<'static, StoreResult<WatchEvent>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    pub key: String,
    pub value: Bytes,
    /// Store revision at which the key was first written
    pub create_revision: u64,
    /// Store revision of the latest write
    pub mod_revision: u64,
}

/// All entries under a prefix, as of `revision`
#[derive(Debug, Clone, Default)]
pub struct KvListing {
    pub entries: Vec<KvEntry>,
    pub revision: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Put,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub key: String,
    /// Empty for deletes
    pub value: Bytes,
    pub revision: u64,
    pub create_revision: u64,
}

/// Read consistency requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadConsistency {
    /// Any replica may answer; may be stale
    Serializable,
    /// Reflects every write acknowledged before the read started
    Linearizable,
}

#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    async fn get(
        &self,
        key: &str,
        consistency: ReadConsistency,
    ) -> StoreResult<Option<KvEntry>>;

    /// Entries under `prefix` in key order
    async fn list(
        &self,
        prefix: &str,
        consistency: ReadConsistency,
    ) -> StoreResult<KvListing>;

    /// Unconditional write; returns the new store revision
    async fn put(
        &self,
        key: &str,
        value: Bytes,
    ) -> StoreResult<u64>;

    /// Returns whether the key existed
    async fn delete(
        &self,
        key: &str,
    ) -> StoreResult<bool>;

    /// Writes only if the key's mod revision equals `expected`
    /// (`None` requires the key to be absent).
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        value: Bytes,
    ) -> StoreResult<u64>;

    /// Deletes only if the key's mod revision equals `expected`
    async fn compare_and_delete(
        &self,
        key: &str,
        expected: u64,
    ) -> StoreResult<()>;

    /// Opens a change stream for every key under `prefix`, starting after the
    /// current revision.
    async fn watch(
        &self,
        prefix: &str,
    ) -> StoreResult<WatchStream>;
}
