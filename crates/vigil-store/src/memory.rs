use crate::store::{Store, StoreChange, StoreError, StoreKey};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::{broadcast, Mutex};

/// In-memory store. The default backend for tests and for embeddings
/// that bring their own persistence.
pub struct MemoryStore {
    values: Mutex<HashMap<StoreKey, Value>>,
    changes: broadcast::Sender<StoreChange>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            values: Mutex::new(HashMap::new()),
            changes,
        }
    }

    /// Seed a key directly, bypassing change notification. Test helper
    /// for "data already on disk" setups.
    pub async fn seed(&self, key: StoreKey, value: Value) {
        self.values.lock().await.insert(key, value);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, keys: &[StoreKey]) -> Result<HashMap<StoreKey, Value>, StoreError> {
        let values = self.values.lock().await;
        Ok(keys
            .iter()
            .filter_map(|key| values.get(key).map(|value| (*key, value.clone())))
            .collect())
    }

    async fn set(&self, entries: Vec<(StoreKey, Value)>) -> Result<(), StoreError> {
        let keys: Vec<StoreKey> = entries.iter().map(|(key, _)| *key).collect();
        {
            let mut values = self.values.lock().await;
            for (key, value) in entries {
                values.insert(key, value);
            }
        }
        // No subscribers is fine; the notification is best effort.
        let _ = self.changes.send(StoreChange { keys });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_then_get_returns_latest_value() {
        let store = MemoryStore::new();
        store
            .set(vec![(StoreKey::BlockedSites, json!(["bad.com"]))])
            .await
            .unwrap();
        store
            .set(vec![(StoreKey::BlockedSites, json!(["bad.com", "worse.com"]))])
            .await
            .unwrap();

        let values = store.get(&[StoreKey::BlockedSites]).await.unwrap();
        assert_eq!(
            values[&StoreKey::BlockedSites],
            json!(["bad.com", "worse.com"])
        );
    }

    #[tokio::test]
    async fn writes_notify_subscribers() {
        let store = MemoryStore::new();
        let mut changes = store.subscribe();
        store
            .set(vec![(StoreKey::LastWeekReset, json!(0))])
            .await
            .unwrap();

        let change = changes.recv().await.unwrap();
        assert_eq!(change.keys, vec![StoreKey::LastWeekReset]);
    }
}
