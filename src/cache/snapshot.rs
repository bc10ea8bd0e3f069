//! Immutable routing view.
//!
//! A [`TargetSnapshot`] is built from a full store listing and then evolved
//! by watch events on a private copy; readers only ever see a finished
//! snapshot through the cache's atomic pointer.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;
use tracing::warn;

use super::PathPattern;
use crate::store::EntryKey;
use crate::store::KeySpace;
use crate::store::KvListing;
use crate::store::WatchEvent;
use crate::store::WatchEventKind;
use crate::DeliveryMode;
use crate::Function;
use crate::FunctionKey;
use crate::Subscription;
use crate::SubscriptionKey;

/// A matched subscription resolved to its function
#[derive(Debug, Clone)]
pub struct Target {
    pub subscription: Arc<Subscription>,
    pub function: Arc<Function>,
    /// Values captured by `:param` and `*catchall` path segments
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
struct FunctionEntry {
    function: Arc<Function>,
    create_revision: u64,
}

#[derive(Debug, Clone)]
struct SubscriptionEntry {
    subscription: Arc<Subscription>,
    pattern: PathPattern,
    create_revision: u64,
}

impl SubscriptionEntry {
    fn accepts(
        &self,
        path: &str,
        method: &str,
    ) -> Option<BTreeMap<String, String>> {
        if self.subscription.method != method {
            return None;
        }
        self.pattern.matches(path)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TargetSnapshot {
    revision: u64,
    functions: HashMap<FunctionKey, FunctionEntry>,
    subscriptions: HashMap<SubscriptionKey, SubscriptionEntry>,
}

impl TargetSnapshot {
    /// Builds a snapshot from a full listing of the gateway prefix.
    /// Undecodable entries are skipped.
    pub fn load(
        keys: &KeySpace,
        listing: &KvListing,
    ) -> Self {
        let mut snapshot = Self {
            revision: listing.revision,
            ..Default::default()
        };
        for entry in &listing.entries {
            snapshot.upsert(keys, &entry.key, &entry.value, entry.create_revision);
        }
        snapshot
    }

    /// Snapshot of the given entries, registered in iteration order.
    pub fn from_entries(
        functions: impl IntoIterator<Item = Function>,
        subscriptions: impl IntoIterator<Item = Subscription>,
    ) -> Self {
        let mut snapshot = Self::default();
        for function in functions {
            snapshot.revision += 1;
            snapshot.functions.insert(
                function.key(),
                FunctionEntry {
                    function: Arc::new(function),
                    create_revision: snapshot.revision,
                },
            );
        }
        for subscription in subscriptions {
            let Ok(pattern) = PathPattern::parse(&subscription.path) else {
                warn!(path = %subscription.path, "skip subscription with invalid path");
                continue;
            };
            snapshot.revision += 1;
            snapshot.subscriptions.insert(
                subscription.key(),
                SubscriptionEntry {
                    subscription: Arc::new(subscription),
                    pattern,
                    create_revision: snapshot.revision,
                },
            );
        }
        snapshot
    }

    /// Applies one watch notification. Returns false when the event was
    /// already covered by this snapshot's revision.
    pub fn apply(
        &mut self,
        keys: &KeySpace,
        event: &WatchEvent,
    ) -> bool {
        if event.revision <= self.revision {
            trace!(revision = event.revision, "skip already applied watch event");
            return false;
        }
        self.revision = event.revision;

        match event.kind {
            WatchEventKind::Put => self.upsert(keys, &event.key, &event.value, event.create_revision),
            WatchEventKind::Delete => match keys.parse(&event.key) {
                Some(EntryKey::Function(key)) => {
                    self.functions.remove(&key);
                }
                Some(EntryKey::Subscription(key)) => {
                    self.subscriptions.remove(&key);
                }
                None => {}
            },
        }
        true
    }

    fn upsert(
        &mut self,
        keys: &KeySpace,
        key: &str,
        value: &[u8],
        create_revision: u64,
    ) {
        match keys.parse(key) {
            Some(EntryKey::Function(fkey)) => match serde_json::from_slice::<Function>(value) {
                Ok(mut function) => {
                    function.space = fkey.space.clone();
                    function.function_id = fkey.function_id.clone();
                    self.functions.insert(
                        fkey,
                        FunctionEntry {
                            function: Arc::new(function),
                            create_revision,
                        },
                    );
                }
                Err(e) => warn!(key, error = %e, "skip undecodable function"),
            },
            Some(EntryKey::Subscription(skey)) => match serde_json::from_slice::<Subscription>(value) {
                Ok(mut subscription) => {
                    subscription.space = skey.space.clone();
                    subscription.subscription_id = skey.subscription_id.clone();
                    match PathPattern::parse(&subscription.path) {
                        Ok(pattern) => {
                            self.subscriptions.insert(
                                skey,
                                SubscriptionEntry {
                                    subscription: Arc::new(subscription),
                                    pattern,
                                    create_revision,
                                },
                            );
                        }
                        Err(e) => warn!(key, error = %e, "skip subscription with invalid path"),
                    }
                }
                Err(e) => warn!(key, error = %e, "skip undecodable subscription"),
            },
            None => trace!(key, "ignore foreign key"),
        }
    }

    /// Store revision this snapshot reflects
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn get_function(
        &self,
        key: &FunctionKey,
    ) -> Option<Arc<Function>> {
        self.functions.get(key).map(|e| e.function.clone())
    }

    pub fn get_subscription(
        &self,
        key: &SubscriptionKey,
    ) -> Option<Arc<Subscription>> {
        self.subscriptions.get(key).map(|e| e.subscription.clone())
    }

    /// Functions in registration order, optionally restricted to one space.
    pub fn functions(
        &self,
        space: Option<&str>,
    ) -> Vec<Arc<Function>> {
        let mut entries: Vec<&FunctionEntry> = self
            .functions
            .values()
            .filter(|e| space.map_or(true, |s| e.function.space == s))
            .collect();
        entries.sort_by_key(|e| e.create_revision);
        entries.into_iter().map(|e| e.function.clone()).collect()
    }

    /// Subscriptions in registration order, optionally restricted to one space.
    pub fn subscriptions(
        &self,
        space: Option<&str>,
    ) -> Vec<Arc<Subscription>> {
        let mut entries: Vec<&SubscriptionEntry> = self
            .subscriptions
            .values()
            .filter(|e| space.map_or(true, |s| e.subscription.space == s))
            .collect();
        entries.sort_by_key(|e| e.create_revision);
        entries.into_iter().map(|e| e.subscription.clone()).collect()
    }

    /// Every subscription matching the event, resolved to its function.
    ///
    /// Order: exact event type before the wildcard, then path specificity,
    /// then registration order. Subscriptions whose function is missing from
    /// this snapshot are not returned.
    pub fn match_subscriptions(
        &self,
        event_type: &str,
        path: &str,
        method: &str,
    ) -> Vec<Target> {
        let mut matched: Vec<(&SubscriptionEntry, BTreeMap<String, String>)> = self
            .subscriptions
            .values()
            .filter(|e| e.subscription.event_type == event_type || e.subscription.is_wildcard_type())
            .filter_map(|e| e.accepts(path, method).map(|params| (e, params)))
            .collect();

        matched.sort_by(|(a, _), (b, _)| Self::precedence(a, b));

        matched
            .into_iter()
            .filter_map(|(entry, params)| {
                let key = FunctionKey::new(
                    entry.subscription.space.clone(),
                    entry.subscription.function_id.clone(),
                );
                let function = self.get_function(&key)?;
                Some(Target {
                    subscription: entry.subscription.clone(),
                    function,
                    params,
                })
            })
            .collect()
    }

    fn precedence(
        a: &SubscriptionEntry,
        b: &SubscriptionEntry,
    ) -> Ordering {
        a.subscription
            .is_wildcard_type()
            .cmp(&b.subscription.is_wildcard_type())
            .then_with(|| a.pattern.specificity_cmp(&b.pattern))
            .then_with(|| a.create_revision.cmp(&b.create_revision))
    }

    /// The single subscription a sync caller is answered by, if any.
    pub fn sync_target(
        &self,
        event_type: &str,
        path: &str,
        method: &str,
    ) -> Option<Target> {
        self.match_subscriptions(event_type, path, method)
            .into_iter()
            .find(|t| t.subscription.mode == DeliveryMode::Sync)
    }

    pub fn async_targets(
        &self,
        event_type: &str,
        path: &str,
        method: &str,
    ) -> Vec<Target> {
        self.match_subscriptions(event_type, path, method)
            .into_iter()
            .filter(|t| t.subscription.mode == DeliveryMode::Async)
            .collect()
    }

    /// Whether any sync subscription serves this path and method, whatever
    /// its event type. A caller hitting such an endpoint expects a response.
    pub fn has_sync_endpoint(
        &self,
        path: &str,
        method: &str,
    ) -> bool {
        self.subscriptions
            .values()
            .filter(|e| e.subscription.mode == DeliveryMode::Sync)
            .any(|e| e.accepts(path, method).is_some())
    }
}
