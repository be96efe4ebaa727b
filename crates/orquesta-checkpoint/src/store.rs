use orquesta_core::{ExecutionState, OrquestaError, OrquestaResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Durable snapshot storage keyed by `session_id`.
///
/// Completed states remain queryable history; a checkpoint is removed only
/// by an explicit session clear, never by normal turn completion.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, state: &ExecutionState) -> OrquestaResult<()>;
    async fn load(&self, session_id: Uuid) -> OrquestaResult<Option<ExecutionState>>;
    async fn delete(&self, session_id: Uuid) -> OrquestaResult<()>;
    async fn list(&self) -> OrquestaResult<Vec<Uuid>>;
}

/// In-memory store for tests and ephemeral deployments.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    states: RwLock<HashMap<Uuid, ExecutionState>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, state: &ExecutionState) -> OrquestaResult<()> {
        let mut states = self.states.write().await;
        states.insert(state.session_id, state.clone());
        Ok(())
    }

    async fn load(&self, session_id: Uuid) -> OrquestaResult<Option<ExecutionState>> {
        let states = self.states.read().await;
        Ok(states.get(&session_id).cloned())
    }

    async fn delete(&self, session_id: Uuid) -> OrquestaResult<()> {
        let mut states = self.states.write().await;
        states.remove(&session_id);
        Ok(())
    }

    async fn list(&self) -> OrquestaResult<Vec<Uuid>> {
        let states = self.states.read().await;
        Ok(states.keys().copied().collect())
    }
}

/// File-based checkpoint store, one JSON file per session.
///
/// Per-key linearizability holds because every session writes to its own
/// file and the orchestrator is the single writer per session.
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub async fn new(dir: PathBuf) -> OrquestaResult<Self> {
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| OrquestaError::Checkpoint(format!("create dir failed: {e}")))?;
        Ok(Self { dir })
    }

    fn checkpoint_path(&self, session_id: Uuid) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, state: &ExecutionState) -> OrquestaResult<()> {
        let path = self.checkpoint_path(state.session_id);
        let json = serde_json::to_string_pretty(state)?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| OrquestaError::Checkpoint(format!("write failed: {e}")))?;
        debug!(session_id = %state.session_id, status = %state.status, "Checkpoint saved");
        Ok(())
    }

    async fn load(&self, session_id: Uuid) -> OrquestaResult<Option<ExecutionState>> {
        let path = self.checkpoint_path(session_id);
        if !path.exists() {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| OrquestaError::Checkpoint(format!("read failed: {e}")))?;
        let state: ExecutionState = serde_json::from_str(&data)
            .map_err(|e| OrquestaError::Checkpoint(format!("parse failed: {e}")))?;
        Ok(Some(state))
    }

    async fn delete(&self, session_id: Uuid) -> OrquestaResult<()> {
        let path = self.checkpoint_path(session_id);
        if path.exists() {
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| OrquestaError::Checkpoint(format!("delete failed: {e}")))?;
        }
        Ok(())
    }

    async fn list(&self) -> OrquestaResult<Vec<Uuid>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| OrquestaError::Checkpoint(format!("read dir failed: {e}")))?;
        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| OrquestaError::Checkpoint(format!("read dir failed: {e}")))?
        {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(stem) = name.strip_suffix(".json") {
                    if let Ok(id) = Uuid::parse_str(stem) {
                        ids.push(id);
                    }
                }
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orquesta_core::ExecutionStatus;

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryCheckpointStore::new();
        let mut state = ExecutionState::new(Uuid::new_v4());
        state.begin_turn("hola");
        store.save(&state).await.unwrap();

        let loaded = store.load(state.session_id).await.unwrap().unwrap();
        assert_eq!(loaded.conversation_history.len(), 1);
        assert_eq!(loaded.status, ExecutionStatus::Processing);

        store.delete(state.session_id).await.unwrap();
        assert!(store.load(state.session_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_roundtrip_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().to_path_buf())
            .await
            .unwrap();

        let state = ExecutionState::new(Uuid::new_v4());
        store.save(&state).await.unwrap();
        let ids = store.list().await.unwrap();
        assert_eq!(ids, vec![state.session_id]);

        let loaded = store.load(state.session_id).await.unwrap().unwrap();
        assert_eq!(loaded.session_id, state.session_id);
    }

    #[tokio::test]
    async fn load_missing_session_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().to_path_buf())
            .await
            .unwrap();
        assert!(store.load(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_overwrites_previous_snapshot() {
        let store = MemoryCheckpointStore::new();
        let mut state = ExecutionState::new(Uuid::new_v4());
        store.save(&state).await.unwrap();

        state.status = ExecutionStatus::Completed;
        store.save(&state).await.unwrap();

        let loaded = store.load(state.session_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ExecutionStatus::Completed);
    }
}
