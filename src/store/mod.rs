//! Persistent JSON store
//!
//! File-backed persistence for the agent snapshot and the alert list.
//! Pretty-printed JSON so snapshots stay inspectable.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::{Error, Result};

/// JSON file store rooted at a data directory
pub struct JsonStore {
    dir: PathBuf,
    agent_snapshot_file: String,
    alerts_file: String,
}

impl JsonStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            dir: PathBuf::from(&config.data_dir),
            agent_snapshot_file: config.agent_snapshot_file.clone(),
            alerts_file: config.alerts_file.clone(),
        }
    }

    pub fn at_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            agent_snapshot_file: "agent_snapshot.json".into(),
            alerts_file: "alerts.json".into(),
        }
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    async fn save_json<T: Serialize>(&self, file: &str, value: &T) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::SnapshotPersistence(e.to_string()))?;

        let data = serde_json::to_string_pretty(value)
            .map_err(|e| Error::SnapshotPersistence(e.to_string()))?;

        let path = self.path(file);
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| Error::SnapshotPersistence(e.to_string()))?;

        debug!(path = %path.display(), "Saved snapshot");
        Ok(())
    }

    async fn load_json<T: DeserializeOwned>(&self, file: &str) -> Result<Option<T>> {
        let path = self.path(file);
        if !Path::new(&path).exists() {
            return Ok(None);
        }

        let data = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::SnapshotPersistence(e.to_string()))?;

        let value = serde_json::from_str(&data)
            .map_err(|e| Error::SnapshotPersistence(e.to_string()))?;

        info!(path = %path.display(), "Loaded snapshot");
        Ok(Some(value))
    }

    /// Write-through of the agent snapshot
    pub async fn save_agent_snapshot(&self, snapshot: &crate::agent::AgentSnapshot) -> Result<()> {
        self.save_json(&self.agent_snapshot_file, snapshot).await
    }

    pub async fn load_agent_snapshot(&self) -> Result<Option<crate::agent::AgentSnapshot>> {
        self.load_json(&self.agent_snapshot_file).await
    }

    /// Alert persistence is optional; failures surface but nothing
    /// depends on it for correctness
    pub async fn save_alerts(&self, alerts: &[crate::alerts::Alert]) -> Result<()> {
        self.save_json(&self.alerts_file, &alerts.to_vec()).await
    }

    pub async fn load_alerts(&self) -> Result<Option<Vec<crate::alerts::Alert>>> {
        self.load_json(&self.alerts_file).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentSnapshot, PerformanceMetrics, QTable};
    use crate::agent::actions::AgentAction;
    use crate::config::EngineConfig;
    use crate::engine::Strategy;

    #[tokio::test]
    async fn test_agent_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::at_dir(dir.path());

        let mut qtable = QTable::new();
        qtable.update("p0_c3_d0_w0_neutral_morning", AgentAction::Wait, -0.01, "next", 0.1, 0.95);
        qtable.update("p1_c3_d0_w1_hot_evening", AgentAction::ExitWinners, 0.4, "next", 0.1, 0.95);

        let snapshot = AgentSnapshot {
            qtable: qtable.to_entries(),
            metrics: PerformanceMetrics::new(10.0),
            strategy: Strategy::from_engine_config(&EngineConfig::default()),
            recent_trades: vec![],
            epsilon: 0.2,
        };

        store.save_agent_snapshot(&snapshot).await.unwrap();
        let loaded = store.load_agent_snapshot().await.unwrap().unwrap();

        assert_eq!(loaded.qtable, snapshot.qtable);
        assert_eq!(loaded.strategy, snapshot.strategy);
        assert_eq!(loaded.epsilon, snapshot.epsilon);

        let rebuilt = QTable::from_entries(&loaded.qtable);
        assert_eq!(rebuilt.to_entries(), qtable.to_entries());
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::at_dir(dir.path());
        assert!(store.load_agent_snapshot().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_errors() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("agent_snapshot.json"), b"not json")
            .await
            .unwrap();
        let store = JsonStore::at_dir(dir.path());
        assert!(matches!(
            store.load_agent_snapshot().await,
            Err(Error::SnapshotPersistence(_))
        ));
    }
}
