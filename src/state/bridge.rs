//! Durable key-value surface for app state and the offline queue.
//!
//! Two independently keyed JSON records under the app home: the UI
//! state snapshot and the offline queue snapshot. They are separate
//! files on purpose, so a corrupt queue record never invalidates
//! settings and vice versa. Writes are whole-snapshot, atomic (temp
//! file + rename), and last-write-wins.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::domain::{PersistedAppState, QueueSnapshot};

const STATE_FILE: &str = "state.json";
const QUEUE_FILE: &str = "queue.json";

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Bridge between in-memory state and its durable snapshots
#[derive(Debug, Clone)]
pub struct StateBridge {
    home: PathBuf,
}

impl StateBridge {
    pub fn new(home: PathBuf) -> Self {
        Self { home }
    }

    /// Idempotent setup of the durable surface
    pub async fn initialize(&self) -> Result<(), BridgeError> {
        fs::create_dir_all(&self.home).await?;
        Ok(())
    }

    /// Load the UI state snapshot; a missing or unreadable record
    /// hydrates as the default state (with a warning, never a crash).
    pub async fn load_persisted_state(&self) -> Result<PersistedAppState, BridgeError> {
        self.load_snapshot(&self.state_path()).await
    }

    pub async fn save_persisted_state(
        &self,
        state: &PersistedAppState,
    ) -> Result<(), BridgeError> {
        self.save_snapshot(&self.state_path(), state).await
    }

    /// Load the offline queue snapshot, independent of the UI state
    pub async fn load_offline_queue(&self) -> Result<QueueSnapshot, BridgeError> {
        self.load_snapshot(&self.queue_path()).await
    }

    pub async fn save_offline_queue(&self, queue: &QueueSnapshot) -> Result<(), BridgeError> {
        self.save_snapshot(&self.queue_path(), queue).await
    }

    /// Remove the UI state record; safe when it does not exist
    pub async fn clear_persisted_state(&self) -> Result<(), BridgeError> {
        remove_if_present(&self.state_path()).await
    }

    /// Remove the queue record; safe when it does not exist
    pub async fn clear_offline_queue(&self) -> Result<(), BridgeError> {
        remove_if_present(&self.queue_path()).await
    }

    fn state_path(&self) -> PathBuf {
        self.home.join(STATE_FILE)
    }

    fn queue_path(&self) -> PathBuf {
        self.home.join(QUEUE_FILE)
    }

    async fn load_snapshot<T: DeserializeOwned + Default>(
        &self,
        path: &Path,
    ) -> Result<T, BridgeError> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "snapshot is unreadable, falling back to default"
                );
                Ok(T::default())
            }
        }
    }

    async fn save_snapshot<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), BridgeError> {
        self.initialize().await?;

        let json = serde_json::to_vec_pretty(value)?;
        let temp_path = path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        fs::rename(&temp_path, path).await?;

        Ok(())
    }
}

async fn remove_if_present(path: &Path) -> Result<(), BridgeError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AppCommand, PendingTranscription};
    use tempfile::TempDir;
    use uuid::Uuid;

    fn create_test_bridge() -> (StateBridge, TempDir) {
        let temp = TempDir::new().unwrap();
        (StateBridge::new(temp.path().join("murmur")), temp)
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let (bridge, _temp) = create_test_bridge();
        bridge.initialize().await.unwrap();
        bridge.initialize().await.unwrap();
    }

    #[tokio::test]
    async fn test_state_roundtrip() {
        let (bridge, _temp) = create_test_bridge();

        let mut state = PersistedAppState::default();
        state.apply(AppCommand::SetLanguage("fr".to_string()));
        bridge.save_persisted_state(&state).await.unwrap();

        let loaded = bridge.load_persisted_state().await.unwrap();
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn test_missing_snapshots_hydrate_as_default() {
        let (bridge, _temp) = create_test_bridge();

        assert_eq!(
            bridge.load_persisted_state().await.unwrap(),
            PersistedAppState::default()
        );
        assert!(bridge.load_offline_queue().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_queue_does_not_affect_state() {
        let (bridge, _temp) = create_test_bridge();
        bridge.initialize().await.unwrap();

        let mut state = PersistedAppState::default();
        state.apply(AppCommand::SetModel("scribe-2".to_string()));
        bridge.save_persisted_state(&state).await.unwrap();

        // Corrupt only the queue record
        fs::write(bridge.queue_path(), b"{ not json")
            .await
            .unwrap();

        let queue = bridge.load_offline_queue().await.unwrap();
        assert!(queue.is_empty());

        let loaded = bridge.load_persisted_state().await.unwrap();
        assert_eq!(loaded.settings.model, "scribe-2");
    }

    #[tokio::test]
    async fn test_queue_roundtrip_preserves_order() {
        let (bridge, _temp) = create_test_bridge();

        let mut snapshot = QueueSnapshot::default();
        for _ in 0..3 {
            snapshot
                .transcriptions
                .push(PendingTranscription::new(Uuid::new_v4(), None));
        }
        bridge.save_offline_queue(&snapshot).await.unwrap();

        let loaded = bridge.load_offline_queue().await.unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let (bridge, _temp) = create_test_bridge();

        bridge
            .save_persisted_state(&PersistedAppState::default())
            .await
            .unwrap();
        bridge.clear_persisted_state().await.unwrap();
        bridge.clear_persisted_state().await.unwrap();
        bridge.clear_offline_queue().await.unwrap();
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let (bridge, _temp) = create_test_bridge();

        let mut first = PersistedAppState::default();
        first.apply(AppCommand::SetLanguage("de".to_string()));
        let mut second = PersistedAppState::default();
        second.apply(AppCommand::SetLanguage("es".to_string()));

        bridge.save_persisted_state(&first).await.unwrap();
        bridge.save_persisted_state(&second).await.unwrap();

        let loaded = bridge.load_persisted_state().await.unwrap();
        assert_eq!(loaded.settings.language, "es");
    }
}
