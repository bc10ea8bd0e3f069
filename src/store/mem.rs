//! Embedded config store
//!
//! An in-process, revisioned key space with prefix watches, used when the
//! gateway runs in development mode and by tests. Reads are always
//! linearizable because there is a single copy of the data.
//!
//! Watch notifications are published on a bounded broadcast channel while
//! the write lock is held, so a watcher opened under the read lock never
//! misses a mutation committed after it subscribed. A watcher that falls
//! more than `watch_buffer` notifications behind receives
//! [`StoreError::WatchLagged`] and is expected to resync.

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::debug;
use tracing::trace;

use super::KvEntry;
use super::KvListing;
use super::KvStore;
use super::ReadConsistency;
use super::StoreResult;
use super::WatchEvent;
use super::WatchEventKind;
use super::WatchStream;
use crate::StoreError;

#[derive(Debug, Clone)]
struct Stored {
    value: Bytes,
    create_revision: u64,
    mod_revision: u64,
}

#[derive(Debug)]
struct MemState {
    data: BTreeMap<String, Stored>,
    revision: u64,
    events: broadcast::Sender<WatchEvent>,
}

#[derive(Debug)]
pub struct MemStore {
    state: RwLock<MemState>,
    watch_buffer: usize,
    available: AtomicBool,
}

impl MemStore {
    pub fn new(watch_buffer: usize) -> Self {
        let (events, _) = broadcast::channel(watch_buffer.max(1));
        Self {
            state: RwLock::new(MemState {
                data: BTreeMap::new(),
                revision: 0,
                events,
            }),
            watch_buffer: watch_buffer.max(1),
            available: AtomicBool::new(true),
        }
    }

    /// Ends every open watch stream, as a store restart would.
    pub fn close_watches(&self) {
        let mut state = self.state.write();
        let (events, _) = broadcast::channel(self.watch_buffer);
        state.events = events;
        debug!("embedded store closed all watch streams");
    }

    /// Simulates the store becoming unreachable (or reachable again).
    /// While unavailable every operation fails and open watches are closed.
    pub fn set_available(
        &self,
        available: bool,
    ) {
        self.available.store(available, Ordering::SeqCst);
        if !available {
            self.close_watches();
        }
    }

    pub fn revision(&self) -> u64 {
        self.state.read().revision
    }

    fn ensure_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("embedded store is offline".into()))
        }
    }

    fn write_locked(
        state: &mut MemState,
        key: &str,
        value: Bytes,
    ) -> u64 {
        state.revision += 1;
        let revision = state.revision;
        let create_revision = state
            .data
            .get(key)
            .map(|s| s.create_revision)
            .unwrap_or(revision);
        state.data.insert(
            key.to_string(),
            Stored {
                value: value.clone(),
                create_revision,
                mod_revision: revision,
            },
        );
        // No receivers is fine: nobody is watching
        let _ = state.events.send(WatchEvent {
            kind: WatchEventKind::Put,
            key: key.to_string(),
            value,
            revision,
            create_revision,
        });
        trace!(key, revision, "put");
        revision
    }

    fn delete_locked(
        state: &mut MemState,
        key: &str,
    ) -> bool {
        match state.data.remove(key) {
            Some(stored) => {
                state.revision += 1;
                let revision = state.revision;
                let _ = state.events.send(WatchEvent {
                    kind: WatchEventKind::Delete,
                    key: key.to_string(),
                    value: Bytes::new(),
                    revision,
                    create_revision: stored.create_revision,
                });
                trace!(key, revision, "delete");
                true
            }
            None => false,
        }
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl KvStore for MemStore {
    async fn get(
        &self,
        key: &str,
        _consistency: ReadConsistency,
    ) -> StoreResult<Option<KvEntry>> {
        self.ensure_available()?;
        let state = self.state.read();
        Ok(state.data.get(key).map(|s| KvEntry {
            key: key.to_string(),
            value: s.value.clone(),
            create_revision: s.create_revision,
            mod_revision: s.mod_revision,
        }))
    }

    async fn list(
        &self,
        prefix: &str,
        _consistency: ReadConsistency,
    ) -> StoreResult<KvListing> {
        self.ensure_available()?;
        let state = self.state.read();
        let entries = state
            .data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, s)| KvEntry {
                key: k.clone(),
                value: s.value.clone(),
                create_revision: s.create_revision,
                mod_revision: s.mod_revision,
            })
            .collect();
        Ok(KvListing {
            entries,
            revision: state.revision,
        })
    }

    async fn put(
        &self,
        key: &str,
        value: Bytes,
    ) -> StoreResult<u64> {
        self.ensure_available()?;
        let mut state = self.state.write();
        Ok(Self::write_locked(&mut state, key, value))
    }

    async fn delete(
        &self,
        key: &str,
    ) -> StoreResult<bool> {
        self.ensure_available()?;
        let mut state = self.state.write();
        Ok(Self::delete_locked(&mut state, key))
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        value: Bytes,
    ) -> StoreResult<u64> {
        self.ensure_available()?;
        let mut state = self.state.write();
        let current = state.data.get(key).map(|s| s.mod_revision);
        if current != expected {
            return Err(StoreError::CasConflict { key: key.to_string() });
        }
        Ok(Self::write_locked(&mut state, key, value))
    }

    async fn compare_and_delete(
        &self,
        key: &str,
        expected: u64,
    ) -> StoreResult<()> {
        self.ensure_available()?;
        let mut state = self.state.write();
        let current = state.data.get(key).map(|s| s.mod_revision);
        if current != Some(expected) {
            return Err(StoreError::CasConflict { key: key.to_string() });
        }
        Self::delete_locked(&mut state, key);
        Ok(())
    }

    async fn watch(
        &self,
        prefix: &str,
    ) -> StoreResult<WatchStream> {
        self.ensure_available()?;
        let receiver = self.state.read().events.subscribe();
        let prefix = prefix.to_string();

        let stream = BroadcastStream::new(receiver).filter_map(move |item| match item {
            Ok(event) if event.key.starts_with(&prefix) => Some(Ok(event)),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => Some(Err(StoreError::WatchLagged { skipped })),
        });
        Ok(Box::pin(stream))
    }
}
