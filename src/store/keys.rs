use crate::constants::FUNCTIONS_DIR;
use crate::constants::SUBSCRIPTIONS_DIR;
use crate::FunctionKey;
use crate::SubscriptionKey;

/// Parsed form of a key inside the gateway namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKey {
    Function(FunctionKey),
    Subscription(SubscriptionKey),
}

/// Layout of the gateway's keys under the configured prefix:
/// `{prefix}/functions/{space}/{id}` and `{prefix}/subscriptions/{space}/{id}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    /// Prefix covering every gateway key, used for list and watch
    pub fn root(&self) -> String {
        format!("{}/", self.prefix)
    }

    pub fn function(
        &self,
        key: &FunctionKey,
    ) -> String {
        format!("{}/{}/{}/{}", self.prefix, FUNCTIONS_DIR, key.space, key.function_id)
    }

    pub fn subscription(
        &self,
        key: &SubscriptionKey,
    ) -> String {
        format!(
            "{}/{}/{}/{}",
            self.prefix, SUBSCRIPTIONS_DIR, key.space, key.subscription_id
        )
    }

    pub fn functions_in(
        &self,
        space: &str,
    ) -> String {
        format!("{}/{}/{}/", self.prefix, FUNCTIONS_DIR, space)
    }

    pub fn subscriptions_in(
        &self,
        space: &str,
    ) -> String {
        format!("{}/{}/{}/", self.prefix, SUBSCRIPTIONS_DIR, space)
    }

    /// Subscriptions of every space
    pub fn all_subscriptions(&self) -> String {
        format!("{}/{}/", self.prefix, SUBSCRIPTIONS_DIR)
    }

    /// Returns `None` for keys outside the gateway layout.
    pub fn parse(
        &self,
        key: &str,
    ) -> Option<EntryKey> {
        let rest = key.strip_prefix(&self.prefix)?.strip_prefix('/')?;
        let mut parts = rest.splitn(3, '/');
        let dir = parts.next()?;
        let space = parts.next().filter(|s| !s.is_empty())?;
        let id = parts.next().filter(|s| !s.is_empty() && !s.contains('/'))?;

        match dir {
            FUNCTIONS_DIR => Some(EntryKey::Function(FunctionKey::new(space, id))),
            SUBSCRIPTIONS_DIR => Some(EntryKey::Subscription(SubscriptionKey::new(space, id))),
            _ => None,
        }
    }
}
