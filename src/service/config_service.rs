use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::cache::PathPattern;
use crate::store::KeySpace;
use crate::store::KvEntry;
use crate::store::KvStore;
use crate::store::ReadConsistency;
use crate::DeliveryMode;
use crate::Error;
use crate::Function;
use crate::FunctionKey;
use crate::RegistryError;
use crate::Result;
use crate::StoreError;
use crate::Subscription;
use crate::SubscriptionKey;

const FUNCTION: &str = "Function";
const SUBSCRIPTION: &str = "Subscription";

/// Registry of functions and subscriptions, written straight to the store.
pub struct ConfigService {
    store: Arc<dyn KvStore>,
    keys: KeySpace,
}

impl ConfigService {
    pub fn new(
        store: Arc<dyn KvStore>,
        keys: KeySpace,
    ) -> Self {
        Self { store, keys }
    }

    pub async fn create_function(
        &self,
        function: Function,
    ) -> Result<Function> {
        function.validate()?;
        let key = self.keys.function(&function.key());

        if self.read(&key).await?.is_some() {
            return Err(already_exists(FUNCTION, &function.function_id));
        }
        self.write(&key, None, &function)
            .await
            .map_err(|e| conflict_as(e, || already_exists(FUNCTION, &function.function_id)))?;

        info!(space = %function.space, function_id = %function.function_id, "function registered");
        Ok(function)
    }

    pub async fn update_function(
        &self,
        function: Function,
    ) -> Result<Function> {
        function.validate()?;
        let key = self.keys.function(&function.key());

        let existing = self
            .read(&key)
            .await?
            .ok_or_else(|| not_found(FUNCTION, &function.function_id))?;
        self.write(&key, Some(existing.mod_revision), &function).await?;

        info!(space = %function.space, function_id = %function.function_id, "function updated");
        Ok(function)
    }

    pub async fn get_function(
        &self,
        key: &FunctionKey,
    ) -> Result<Function> {
        let entry = self
            .read(&self.keys.function(key))
            .await?
            .ok_or_else(|| not_found(FUNCTION, &key.function_id))?;
        decode(&entry)
    }

    pub async fn list_functions(
        &self,
        space: &str,
    ) -> Result<Vec<Function>> {
        self.list(&self.keys.functions_in(space)).await
    }

    /// Fails with [`RegistryError::FunctionInUse`] while any subscription in
    /// the function's space still targets it.
    pub async fn delete_function(
        &self,
        key: &FunctionKey,
    ) -> Result<()> {
        let store_key = self.keys.function(key);
        let existing = self
            .read(&store_key)
            .await?
            .ok_or_else(|| not_found(FUNCTION, &key.function_id))?;

        let subscriptions: Vec<Subscription> = self.list(&self.keys.subscriptions_in(&key.space)).await?;
        let in_use = subscriptions
            .iter()
            .filter(|s| s.function_id == key.function_id)
            .count();
        if in_use > 0 {
            return Err(RegistryError::FunctionInUse {
                function_id: key.function_id.clone(),
                subscriptions: in_use,
            }
            .into());
        }

        self.store
            .compare_and_delete(&store_key, existing.mod_revision)
            .await?;
        info!(space = %key.space, function_id = %key.function_id, "function deleted");
        Ok(())
    }

    /// Registers a subscription. The id is derived from the matcher and the
    /// target, so registering the same binding twice is `AlreadyExists`.
    pub async fn create_subscription(
        &self,
        mut subscription: Subscription,
    ) -> Result<Subscription> {
        subscription.normalize();
        subscription.validate()?;

        let function_key = FunctionKey::new(subscription.space.clone(), subscription.function_id.clone());
        if self.read(&self.keys.function(&function_key)).await?.is_none() {
            return Err(RegistryError::FunctionNotFound(subscription.function_id.clone()).into());
        }

        let key = self.keys.subscription(&subscription.key());
        if self.read(&key).await?.is_some() {
            return Err(already_exists(SUBSCRIPTION, &subscription.subscription_id));
        }
        if subscription.mode == DeliveryMode::Sync {
            self.ensure_endpoint_free(&subscription).await?;
        }

        self.write(&key, None, &subscription)
            .await
            .map_err(|e| conflict_as(e, || already_exists(SUBSCRIPTION, &subscription.subscription_id)))?;

        info!(
            space = %subscription.space,
            subscription_id = %subscription.subscription_id,
            mode = %subscription.mode,
            "subscription registered"
        );
        Ok(subscription)
    }

    /// Replaces the metadata of an existing subscription. The matcher and
    /// the target make up the id and cannot change.
    pub async fn update_subscription(
        &self,
        key: &SubscriptionKey,
        subscription: Subscription,
    ) -> Result<Subscription> {
        let mut subscription = subscription.in_space(key.space.clone());
        subscription.normalize();
        if subscription.subscription_id != key.subscription_id {
            return Err(RegistryError::Validation(
                "type, eventType, functionId, path and method of a subscription are immutable".into(),
            )
            .into());
        }
        subscription.validate()?;

        let store_key = self.keys.subscription(key);
        let existing = self
            .read(&store_key)
            .await?
            .ok_or_else(|| not_found(SUBSCRIPTION, &key.subscription_id))?;
        self.write(&store_key, Some(existing.mod_revision), &subscription)
            .await?;

        info!(space = %key.space, subscription_id = %key.subscription_id, "subscription updated");
        Ok(subscription)
    }

    pub async fn get_subscription(
        &self,
        key: &SubscriptionKey,
    ) -> Result<Subscription> {
        let entry = self
            .read(&self.keys.subscription(key))
            .await?
            .ok_or_else(|| not_found(SUBSCRIPTION, &key.subscription_id))?;
        decode(&entry)
    }

    pub async fn list_subscriptions(
        &self,
        space: &str,
    ) -> Result<Vec<Subscription>> {
        self.list(&self.keys.subscriptions_in(space)).await
    }

    pub async fn delete_subscription(
        &self,
        key: &SubscriptionKey,
    ) -> Result<()> {
        let store_key = self.keys.subscription(key);
        let existing = self
            .read(&store_key)
            .await?
            .ok_or_else(|| not_found(SUBSCRIPTION, &key.subscription_id))?;

        self.store
            .compare_and_delete(&store_key, existing.mod_revision)
            .await?;
        info!(space = %key.space, subscription_id = %key.subscription_id, "subscription deleted");
        Ok(())
    }

    /// Sync endpoints are global: two sync subscriptions with the same
    /// method, event type and an equivalent path would make routing
    /// ambiguous, whatever their spaces.
    async fn ensure_endpoint_free(
        &self,
        subscription: &Subscription,
    ) -> Result<()> {
        let pattern = PathPattern::parse(&subscription.path).map_err(RegistryError::Validation)?;
        let existing: Vec<Subscription> = self.list(&self.keys.all_subscriptions()).await?;

        let taken = existing.iter().any(|other| {
            other.mode == DeliveryMode::Sync
                && other.method == subscription.method
                && other.event_type == subscription.event_type
                && PathPattern::parse(&other.path)
                    .map(|p| p.equivalent(&pattern))
                    .unwrap_or(false)
        });
        if taken {
            return Err(RegistryError::PathConflict {
                method: subscription.method.clone(),
                path: subscription.path.clone(),
                event_type: subscription.event_type.clone(),
            }
            .into());
        }
        Ok(())
    }

    async fn read(
        &self,
        key: &str,
    ) -> Result<Option<KvEntry>> {
        Ok(self.store.get(key, ReadConsistency::Linearizable).await?)
    }

    async fn list<T: DeserializeOwned>(
        &self,
        prefix: &str,
    ) -> Result<Vec<T>> {
        let listing = self.store.list(prefix, ReadConsistency::Linearizable).await?;
        debug!(prefix, entries = listing.entries.len(), "listed registry entries");

        let mut items = Vec::with_capacity(listing.entries.len());
        for entry in &listing.entries {
            match decode(entry) {
                Ok(item) => items.push(item),
                Err(e) => warn!(key = %entry.key, error = %e, "skip undecodable registry entry"),
            }
        }
        Ok(items)
    }

    async fn write<T: Serialize>(
        &self,
        key: &str,
        expected: Option<u64>,
        value: &T,
    ) -> Result<u64> {
        let payload = Bytes::from(serde_json::to_vec(value).map_err(StoreError::from)?);
        Ok(self.store.compare_and_swap(key, expected, payload).await?)
    }
}

fn decode<T: DeserializeOwned>(entry: &KvEntry) -> Result<T> {
    serde_json::from_slice(&entry.value).map_err(|source| {
        StoreError::Decode {
            key: entry.key.clone(),
            source,
        }
        .into()
    })
}

fn not_found(
    kind: &'static str,
    id: &str,
) -> Error {
    RegistryError::NotFound {
        kind,
        id: id.to_string(),
    }
    .into()
}

fn already_exists(
    kind: &'static str,
    id: &str,
) -> Error {
    RegistryError::AlreadyExists {
        kind,
        id: id.to_string(),
    }
    .into()
}

/// A create racing another create loses the CAS; report it as a duplicate.
fn conflict_as(
    e: Error,
    replacement: impl FnOnce() -> Error,
) -> Error {
    match e {
        Error::Store(StoreError::CasConflict { .. }) => replacement(),
        other => other,
    }
}
