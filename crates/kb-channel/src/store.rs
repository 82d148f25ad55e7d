//! Shared key-value and pub/sub store abstraction.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::warn;

use crate::Result;

/// Channel capacity for in-memory subscriptions.
const CHANNEL_CAPACITY: usize = 256;

/// Key-value get/set plus publish/subscribe.
#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Publish `message`; returns the number of subscribers reached.
    async fn publish(&self, channel: &str, message: &str) -> Result<usize>;

    async fn subscribe(&self, channel: &str) -> Result<Subscription>;
}

/// Messages arriving on one channel.
///
/// Dropping the subscription unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    channel: String,
    receiver: broadcast::Receiver<String>,
}

impl Subscription {
    pub fn new(channel: impl Into<String>, receiver: broadcast::Receiver<String>) -> Self {
        Self {
            channel: channel.into(),
            receiver,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Next message, or `None` once the channel is closed.
    ///
    /// Messages missed because the subscriber lagged are skipped.
    pub async fn recv(&mut self) -> Option<String> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(channel = %self.channel, skipped, "subscriber lagged, messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// In-process store shared by clones.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    values: Mutex<HashMap<String, String>>,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        let mut channels = self
            .inner
            .channels
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.inner.values.lock().unwrap_or_else(|p| p.into_inner());
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.inner.values.lock().unwrap_or_else(|p| p.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<usize> {
        // No receivers is not an error for pub/sub
        Ok(self.sender(channel).send(message.to_string()).unwrap_or(0))
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription> {
        Ok(Subscription::new(channel, self.sender(channel).subscribe()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_set_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let store = MemoryStore::new();
        let mut a = store.subscribe("ch").await.unwrap();
        let mut b = store.clone().subscribe("ch").await.unwrap();

        assert_eq!(store.publish("ch", "hello").await.unwrap(), 2);
        assert_eq!(a.recv().await.as_deref(), Some("hello"));
        assert_eq!(b.recv().await.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let store = MemoryStore::new();
        assert_eq!(store.publish("nobody", "x").await.unwrap(), 0);
    }
}
