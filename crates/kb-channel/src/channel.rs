//! The replication channel: snapshot mirror plus change notifications.

use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::connection::{ConnectionRole, ConnectionState, ConnectionTracker};
use crate::notify::{HealthChanged, RegistryChanged};
use crate::reconnect::ReconnectPolicy;
use crate::store::{SharedStore, Subscription};
use crate::Result;

/// Namespaced keys and channel names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelKeys {
    pub snapshot: String,
    pub registry_changed: String,
    pub health_changed: String,
}

impl ChannelKeys {
    pub fn new(namespace: &str) -> Self {
        let ns = namespace.trim_end_matches(':');
        Self {
            snapshot: format!("{ns}:registry:snapshot"),
            registry_changed: format!("{ns}:registry:changed"),
            health_changed: format!("{ns}:health:changed"),
        }
    }

    /// Override the registry notification channel name.
    pub fn with_registry_channel(mut self, channel: Option<String>) -> Self {
        if let Some(channel) = channel {
            self.registry_changed = channel;
        }
        self
    }

    /// Override the health notification channel name.
    pub fn with_health_channel(mut self, channel: Option<String>) -> Self {
        if let Some(channel) = channel {
            self.health_changed = channel;
        }
        self
    }
}

impl Default for ChannelKeys {
    fn default() -> Self {
        Self::new("kb")
    }
}

/// Publisher, subscriber, and shared-cache roles over one store.
pub struct ReplicationChannel {
    store: Arc<dyn SharedStore>,
    keys: ChannelKeys,
    policy: ReconnectPolicy,
    publisher: ConnectionTracker,
    subscriber: ConnectionTracker,
    cache: ConnectionTracker,
}

impl ReplicationChannel {
    pub fn new(store: Arc<dyn SharedStore>, keys: ChannelKeys, policy: ReconnectPolicy) -> Self {
        Self {
            store,
            keys,
            policy,
            publisher: ConnectionTracker::new(ConnectionRole::Publisher),
            subscriber: ConnectionTracker::new(ConnectionRole::Subscriber),
            cache: ConnectionTracker::new(ConnectionRole::Cache),
        }
    }

    pub fn keys(&self) -> &ChannelKeys {
        &self.keys
    }

    pub fn tracker(&self, role: ConnectionRole) -> &ConnectionTracker {
        match role {
            ConnectionRole::Publisher => &self.publisher,
            ConnectionRole::Subscriber => &self.subscriber,
            ConnectionRole::Cache => &self.cache,
        }
    }

    /// `(role, last error)` for every role, for health reporting.
    pub fn component_errors(&self) -> Vec<(ConnectionRole, Option<String>)> {
        [&self.publisher, &self.subscriber, &self.cache]
            .into_iter()
            .map(|t| (t.role(), t.last_error()))
            .collect()
    }

    async fn publish_json<T: Serialize>(&self, channel: &str, message: &T) -> Result<usize> {
        let payload = serde_json::to_string(message)?;
        match self.store.publish(channel, &payload).await {
            Ok(receivers) => {
                self.publisher.transition(ConnectionState::Ready);
                debug!(channel, receivers, "notification published");
                Ok(receivers)
            }
            Err(e) => {
                self.publisher.record_error(&e);
                Err(e)
            }
        }
    }

    pub async fn publish_registry_changed(&self, message: &RegistryChanged) -> Result<usize> {
        self.publish_json(&self.keys.registry_changed, message).await
    }

    pub async fn publish_health(&self, message: &HealthChanged) -> Result<usize> {
        self.publish_json(&self.keys.health_changed, message).await
    }

    /// Store the full snapshot document under the snapshot key.
    pub async fn mirror_snapshot(&self, document: &str) -> Result<()> {
        match self.store.set(&self.keys.snapshot, document).await {
            Ok(()) => {
                self.cache.transition(ConnectionState::Ready);
                Ok(())
            }
            Err(e) => {
                self.cache.record_error(&e);
                Err(e)
            }
        }
    }

    /// Read the mirrored snapshot document, if any.
    pub async fn fetch_snapshot(&self) -> Result<Option<String>> {
        match self.store.get(&self.keys.snapshot).await {
            Ok(document) => {
                self.cache.transition(ConnectionState::Ready);
                Ok(document)
            }
            Err(e) => {
                self.cache.record_error(&e);
                Err(e)
            }
        }
    }

    /// Subscribe to registry notifications, retrying with backoff.
    ///
    /// Returns `None` if `cancel` fires before a subscription is made.
    pub async fn subscribe_registry(&self, cancel: &CancellationToken) -> Option<RegistryStream> {
        let channel = &self.keys.registry_changed;
        self.subscriber.transition(ConnectionState::Connect);
        loop {
            match self.store.subscribe(channel).await {
                Ok(subscription) => {
                    self.subscriber.transition(ConnectionState::Ready);
                    return Some(RegistryStream { subscription });
                }
                Err(e) => {
                    self.subscriber.record_error(&e);
                    let attempt = self.subscriber.next_attempt();
                    let delay = self.policy.delay(attempt);
                    self.subscriber.transition(ConnectionState::Reconnecting);
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            self.subscriber.transition(ConnectionState::End);
                            return None;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Mark every role closed.
    pub fn quiesce(&self) {
        for tracker in [&self.publisher, &self.subscriber, &self.cache] {
            tracker.transition(ConnectionState::End);
        }
    }
}

/// Decoded registry notifications.
#[derive(Debug)]
pub struct RegistryStream {
    subscription: Subscription,
}

impl RegistryStream {
    /// Next well-formed notification; malformed messages are skipped.
    pub async fn next(&mut self) -> Option<RegistryChanged> {
        loop {
            let raw = self.subscription.recv().await?;
            match serde_json::from_str(&raw) {
                Ok(message) => return Some(message),
                Err(e) => {
                    warn!(channel = %self.subscription.channel(), error = %e, "ignoring malformed notification");
                }
            }
        }
    }
}
