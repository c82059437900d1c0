//! Persistence for [`ConversationState`].
//!
//! Blobs are kept as raw JSON so that [`migrate`] runs on every load,
//! whichever version wrote them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::state::{migrate, ConversationState};
use super::NavigationError;

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, user_id: i64) -> Result<Option<ConversationState>, NavigationError>;

    async fn save(&self, user_id: i64, state: &ConversationState) -> Result<(), NavigationError>;

    async fn delete(&self, user_id: i64) -> Result<(), NavigationError>;
}

fn encode(state: &ConversationState) -> Result<Value, NavigationError> {
    serde_json::to_value(state).map_err(|e| NavigationError::Storage(e.to_string()))
}

#[derive(Default)]
pub struct MemoryStateStore {
    blobs: RwLock<HashMap<i64, Value>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw blob as an older release would have written it
    pub async fn insert_raw(&self, user_id: i64, blob: Value) {
        self.blobs.write().await.insert(user_id, blob);
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, user_id: i64) -> Result<Option<ConversationState>, NavigationError> {
        let blob = self.blobs.read().await.get(&user_id).cloned();
        blob.map(migrate).transpose()
    }

    async fn save(&self, user_id: i64, state: &ConversationState) -> Result<(), NavigationError> {
        let blob = encode(state)?;
        self.blobs.write().await.insert(user_id, blob);
        Ok(())
    }

    async fn delete(&self, user_id: i64) -> Result<(), NavigationError> {
        self.blobs.write().await.remove(&user_id);
        Ok(())
    }
}

/// All conversations in one pretty-printed JSON file, rewritten on every change
pub struct JsonFileStateStore {
    path: PathBuf,
    blobs: RwLock<HashMap<String, Value>>,
}

impl JsonFileStateStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, NavigationError> {
        let path = path.as_ref().to_path_buf();
        let blobs = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| NavigationError::Storage(format!("read {}: {e}", path.display())))?;
            serde_json::from_str(&contents)
                .map_err(|e| NavigationError::CorruptState(format!("{}: {e}", path.display())))?
        } else {
            HashMap::new()
        };
        tracing::debug!(path = %path.display(), "Conversation states opened");
        Ok(Self {
            path,
            blobs: RwLock::new(blobs),
        })
    }

    async fn persist(&self, blobs: &HashMap<String, Value>) -> Result<(), NavigationError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| NavigationError::Storage(e.to_string()))?;
        }
        let contents = serde_json::to_string_pretty(blobs)
            .map_err(|e| NavigationError::Storage(e.to_string()))?;
        tokio::fs::write(&self.path, contents)
            .await
            .map_err(|e| NavigationError::Storage(format!("write {}: {e}", self.path.display())))
    }
}

#[async_trait]
impl StateStore for JsonFileStateStore {
    async fn load(&self, user_id: i64) -> Result<Option<ConversationState>, NavigationError> {
        let blob = self.blobs.read().await.get(&user_id.to_string()).cloned();
        blob.map(migrate).transpose()
    }

    async fn save(&self, user_id: i64, state: &ConversationState) -> Result<(), NavigationError> {
        let blob = encode(state)?;
        let mut blobs = self.blobs.write().await;
        blobs.insert(user_id.to_string(), blob);
        self.persist(&blobs).await
    }

    async fn delete(&self, user_id: i64) -> Result<(), NavigationError> {
        let mut blobs = self.blobs.write().await;
        if blobs.remove(&user_id.to_string()).is_some() {
            self.persist(&blobs).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use tempfile::TempDir;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_memory_round_trip_and_delete() {
        let store = MemoryStateStore::new();
        assert_eq!(store.load(7).await.unwrap(), None);

        let state = ConversationState::for_session(Uuid::new_v4());
        store.save(7, &state).await.unwrap();
        assert_eq!(store.load(7).await.unwrap(), Some(state));

        store.delete(7).await.unwrap();
        assert_eq!(store.load(7).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_raw_blob_migrated_on_load() {
        let store = MemoryStateStore::new();
        store
            .insert_raw(3, json!({ "version": 1, "pending_confirmation": "cancel" }))
            .await;
        let state = store.load(3).await.unwrap().unwrap();
        assert_eq!(state.version, 2);
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("conversations.json");

        let mut state = ConversationState::for_session(Uuid::new_v4());
        state.is_processing = true;
        state.processing_started = Some(Utc::now());
        {
            let store = JsonFileStateStore::open(&path).unwrap();
            store.save(42, &state).await.unwrap();
        }

        let reopened = JsonFileStateStore::open(&path).unwrap();
        let loaded = reopened.load(42).await.unwrap().unwrap();
        assert!(loaded.is_processing);
        assert_eq!(loaded.session_id, state.session_id);

        reopened.delete(42).await.unwrap();
        let again = JsonFileStateStore::open(&path).unwrap();
        assert_eq!(again.load(42).await.unwrap(), None);
    }

    #[test]
    fn test_corrupt_file_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conversations.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            JsonFileStateStore::open(&path),
            Err(NavigationError::CorruptState(_))
        ));
    }
}
