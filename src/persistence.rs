use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{CurrentStatus, Observation};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable form of the health store, keyed by endpoint address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub endpoints: BTreeMap<String, EndpointSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointSnapshot {
    pub status: CurrentStatus,
    pub history: Vec<Observation>,
}

#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Written to a temp file and renamed over the target.
    pub async fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        let bytes = serde_json::to_vec(snapshot)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "snapshot saved");
        Ok(())
    }

    /// Missing or unparsable files yield an empty snapshot; damage is
    /// contained per endpoint.
    pub async fn load(&self) -> Snapshot {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no snapshot found, starting fresh");
                return Snapshot::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "snapshot unreadable, starting fresh");
                return Snapshot::default();
            }
        };

        let endpoints = match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(mut root)) => match root.remove("endpoints") {
                Some(Value::Object(endpoints)) => endpoints,
                _ => {
                    warn!(path = %self.path.display(), "snapshot has no endpoint table, starting fresh");
                    return Snapshot::default();
                }
            },
            Ok(_) => {
                warn!(path = %self.path.display(), "snapshot is not a JSON object, starting fresh");
                return Snapshot::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "snapshot malformed, starting fresh");
                return Snapshot::default();
            }
        };

        let endpoints = endpoints
            .into_iter()
            .map(|(address, entry)| {
                let entry = decode_entry(&address, entry);
                (address, entry)
            })
            .collect();

        Snapshot { endpoints }
    }
}

fn decode_entry(address: &str, mut entry: Value) -> EndpointSnapshot {
    let status = entry
        .get_mut("status")
        .map(Value::take)
        .and_then(|v| serde_json::from_value::<CurrentStatus>(v).ok())
        .unwrap_or_else(|| {
            warn!(%address, "stored status invalid, using default");
            CurrentStatus::default()
        });

    let history = match entry.get_mut("history").map(Value::take) {
        Some(v) => match serde_json::from_value::<Vec<Observation>>(v) {
            Ok(history) if is_ordered(&history) => history,
            Ok(_) => {
                warn!(%address, "stored history out of order, resetting");
                Vec::new()
            }
            Err(e) => {
                warn!(%address, error = %e, "stored history invalid, resetting");
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    EndpointSnapshot { status, history }
}

fn is_ordered(history: &[Observation]) -> bool {
    history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};
    use tempfile::TempDir;

    fn at(minutes: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap() + Duration::minutes(minutes)
    }

    fn sample() -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot.endpoints.insert(
            "10.0.0.1".into(),
            EndpointSnapshot {
                status: CurrentStatus { available: true, response_time_ms: Some(18) },
                history: vec![
                    Observation { timestamp: at(0), success: true },
                    Observation { timestamp: at(1), success: false },
                    Observation { timestamp: at(2), success: true },
                ],
            },
        );
        snapshot.endpoints.insert(
            "10.0.0.2".into(),
            EndpointSnapshot {
                status: CurrentStatus { available: false, response_time_ms: None },
                history: vec![Observation { timestamp: at(2), success: false }],
            },
        );
        snapshot
    }

    #[tokio::test]
    async fn save_then_load_reproduces_state() {
        let dir = TempDir::new().unwrap();
        let file = SnapshotFile::new(dir.path().join("state.json"));

        let snapshot = sample();
        file.save(&snapshot).await.unwrap();
        assert_eq!(file.load().await, snapshot);
    }

    #[tokio::test]
    async fn save_overwrites_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let file = SnapshotFile::new(dir.path().join("state.json"));

        file.save(&sample()).await.unwrap();
        file.save(&Snapshot::default()).await.unwrap();
        assert_eq!(file.load().await, Snapshot::default());
        assert!(!dir.path().join("state.tmp").exists());
    }

    #[tokio::test]
    async fn save_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let file = SnapshotFile::new(dir.path().join("nested/deeper/state.json"));
        file.save(&sample()).await.unwrap();
        assert!(file.path().exists());
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let file = SnapshotFile::new(dir.path().join("absent.json"));
        assert_eq!(file.load().await, Snapshot::default());
    }

    #[tokio::test]
    async fn malformed_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert_eq!(SnapshotFile::new(path).load().await, Snapshot::default());
    }

    #[tokio::test]
    async fn corrupt_series_is_reset_without_affecting_others() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let doc = serde_json::json!({
            "endpoints": {
                "10.0.0.1": {
                    "status": {"available": false, "response_time_ms": null},
                    "history": "garbage"
                },
                "10.0.0.2": {
                    "status": {"available": true, "response_time_ms": 7},
                    "history": [
                        {"timestamp": "2023-11-14T22:13:20Z", "success": true}
                    ]
                },
                "10.0.0.3": {
                    "status": 42,
                    "history": [
                        {"timestamp": "2023-11-14T22:15:00Z", "success": true},
                        {"timestamp": "2023-11-14T22:13:20Z", "success": false}
                    ]
                }
            }
        });
        std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

        let snapshot = SnapshotFile::new(path).load().await;

        let first = &snapshot.endpoints["10.0.0.1"];
        assert_eq!(first.status, CurrentStatus { available: false, response_time_ms: None });
        assert!(first.history.is_empty());

        let second = &snapshot.endpoints["10.0.0.2"];
        assert_eq!(second.status.response_time_ms, Some(7));
        assert_eq!(second.history.len(), 1);

        let third = &snapshot.endpoints["10.0.0.3"];
        assert_eq!(third.status, CurrentStatus::default());
        assert!(third.history.is_empty());
    }
}
