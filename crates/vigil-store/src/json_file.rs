use crate::store::{Store, StoreChange, StoreError, StoreKey};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::{broadcast, Mutex};

/// Default on-disk location for the store file.
///
/// # Errors
///
/// Returns an error if the local data directory cannot be determined.
pub fn default_store_path() -> Result<PathBuf, StoreError> {
    let mut path = dirs::data_local_dir()
        .ok_or_else(|| StoreError::Backend("failed to get local data dir".to_string()))?;
    path.push("vigil");
    path.push("store.json");
    Ok(path)
}

/// Whole-map JSON file store. Durability is best effort: every `set`
/// rewrites the file, and a write failure is reported to the caller but
/// leaves the in-memory copy updated.
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<HashMap<StoreKey, Value>>,
    changes: broadcast::Sender<StoreChange>,
}

impl JsonFileStore {
    /// Open the store at `path`, loading any existing contents. Unknown
    /// keys in the file are ignored; a missing file starts empty.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut values = HashMap::new();

        match tokio::fs::read(&path).await {
            Ok(raw) => {
                let parsed: HashMap<String, Value> = serde_json::from_slice(&raw)?;
                for (name, value) in parsed {
                    if let Some(key) = StoreKey::from_wire_name(&name) {
                        values.insert(key, value);
                    } else {
                        log::warn!("ignoring unknown store key in {}: {name}", path.display());
                    }
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        let (changes, _) = broadcast::channel(64);
        Ok(Self {
            path,
            values: Mutex::new(values),
            changes,
        })
    }

    async fn persist(&self, values: &HashMap<StoreKey, Value>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let by_name: HashMap<&str, &Value> = values
            .iter()
            .map(|(key, value)| (key.as_str(), value))
            .collect();
        let raw = serde_json::to_vec_pretty(&by_name)?;
        tokio::fs::write(&self.path, raw).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for JsonFileStore {
    async fn get(&self, keys: &[StoreKey]) -> Result<HashMap<StoreKey, Value>, StoreError> {
        let values = self.values.lock().await;
        Ok(keys
            .iter()
            .filter_map(|key| values.get(key).map(|value| (*key, value.clone())))
            .collect())
    }

    async fn set(&self, entries: Vec<(StoreKey, Value)>) -> Result<(), StoreError> {
        let keys: Vec<StoreKey> = entries.iter().map(|(key, _)| *key).collect();
        let mut values = self.values.lock().await;
        for (key, value) in entries {
            values.insert(key, value);
        }
        let result = self.persist(&values).await;
        drop(values);

        let _ = self.changes.send(StoreChange { keys });
        result
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
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        {
            let store = JsonFileStore::open(&path).await.unwrap();
            store
                .set(vec![(StoreKey::BlockedSites, json!(["bad.com"]))])
                .await
                .unwrap();
        }

        let reopened = JsonFileStore::open(&path).await.unwrap();
        let values = reopened.get(&[StoreKey::BlockedSites]).await.unwrap();
        assert_eq!(values[&StoreKey::BlockedSites], json!(["bad.com"]));
    }

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("absent.json"))
            .await
            .unwrap();
        let values = store.get(&StoreKey::ALL).await.unwrap();
        assert!(values.is_empty());
    }

    #[tokio::test]
    async fn unknown_keys_are_dropped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        tokio::fs::write(&path, r#"{"sessionTimings": [], "legacy": 1}"#)
            .await
            .unwrap();

        let store = JsonFileStore::open(&path).await.unwrap();
        let values = store.get(&StoreKey::ALL).await.unwrap();
        assert_eq!(values.len(), 1);
        assert!(values.contains_key(&StoreKey::SessionTimings));
    }
}
