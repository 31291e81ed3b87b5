//! Session snapshots and where they are kept
//!
//! A [`SessionSnapshot`] is the serialized form of all four dataset slots. It is always
//! written whole; there is no partial update. Storage sits behind the [`SnapshotStore`]
//! trait so the session does not care whether snapshots land on disk or in memory.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::aggregator::{FileRef, UploadStatus};
use crate::dispatcher::ProcessedFile;
use crate::error::{Result, UploadError};
use crate::schema::SchemaId;

/// `{ files, uploadStatus, uploadedData }`, each keyed by schema with `null` for empty slots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    #[serde(default)]
    pub files: BTreeMap<SchemaId, Option<FileRef>>,
    #[serde(default)]
    pub upload_status: BTreeMap<SchemaId, Option<UploadStatus>>,
    #[serde(default)]
    pub uploaded_data: BTreeMap<SchemaId, Option<ProcessedFile>>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            files: SchemaId::ALL.into_iter().map(|id| (id, None)).collect(),
            upload_status: SchemaId::ALL.into_iter().map(|id| (id, None)).collect(),
            uploaded_data: SchemaId::ALL.into_iter().map(|id| (id, None)).collect(),
        }
    }
}

impl SessionSnapshot {
    /// Parse a stored snapshot. Malformed input yields the empty state.
    pub fn from_json_or_default(json: &str) -> Self {
        match serde_json::from_str(json) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed session snapshot");
                Self::default()
            }
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn file(&self, schema: SchemaId) -> Option<&FileRef> {
        self.files.get(&schema).and_then(Option::as_ref)
    }

    pub fn status(&self, schema: SchemaId) -> Option<UploadStatus> {
        self.upload_status.get(&schema).copied().flatten()
    }

    pub fn data(&self, schema: SchemaId) -> Option<&ProcessedFile> {
        self.uploaded_data.get(&schema).and_then(Option::as_ref)
    }
}

/// Persistence hook for session snapshots
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Last saved snapshot, `None` when nothing has been saved yet
    async fn load(&self) -> Result<Option<SessionSnapshot>>;

    /// Replace the stored snapshot
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<()>;
}

/// JSON snapshot on disk, replaced atomically through a sibling temp file
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_error(&self, details: impl ToString) -> UploadError {
        UploadError::SnapshotFile {
            path: self.path.clone(),
            details: details.to_string(),
        }
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn load(&self) -> Result<Option<SessionSnapshot>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => Ok(Some(SessionSnapshot::from_json_or_default(&json))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.file_error(e)),
        }
    }

    async fn save(&self, snapshot: &SessionSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.file_error(e))?;
        }

        let json = snapshot.to_json()?;
        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, json)
            .await
            .map_err(|e| self.file_error(e))?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| self.file_error(e))?;

        debug!(path = %self.path.display(), "Session snapshot saved");
        Ok(())
    }
}

/// In-memory store, mostly for tests
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshot: Mutex<Option<SessionSnapshot>>,
    saves: Mutex<usize>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: SessionSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
            saves: Mutex::new(0),
        }
    }

    /// Number of completed saves
    pub async fn save_count(&self) -> usize {
        *self.saves.lock().await
    }

    pub async fn current(&self) -> Option<SessionSnapshot> {
        self.snapshot.lock().await.clone()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self) -> Result<Option<SessionSnapshot>> {
        Ok(self.snapshot.lock().await.clone())
    }

    async fn save(&self, snapshot: &SessionSnapshot) -> Result<()> {
        *self.snapshot.lock().await = Some(snapshot.clone());
        *self.saves.lock().await += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::ProcessedState;
    use crate::record::{CellValue, Record};
    use tempfile::TempDir;

    fn sample_snapshot() -> SessionSnapshot {
        let mut snapshot = SessionSnapshot::default();
        let record: Record = [("case_id", CellValue::from("C-1"))].into_iter().collect();

        snapshot.files.insert(
            SchemaId::Cms,
            Some(FileRef {
                name: "cms.csv".to_string(),
                size: 42,
            }),
        );
        snapshot
            .upload_status
            .insert(SchemaId::Cms, Some(UploadStatus::Success));
        snapshot.uploaded_data.insert(
            SchemaId::Cms,
            Some(ProcessedFile {
                name: "cms.csv".to_string(),
                size: 42,
                rows: 1,
                data: vec![record],
                processed_at: "2024-03-01T10:00:00Z".parse().unwrap(),
                status: ProcessedState::Processed,
                field_name: "CMS".to_string(),
            }),
        );
        snapshot
            .upload_status
            .insert(SchemaId::Snt, Some(UploadStatus::Error));
        snapshot
    }

    #[test]
    fn test_default_has_null_for_every_schema() {
        let value = serde_json::to_value(SessionSnapshot::default()).unwrap();

        for key in ["files", "uploadStatus", "uploadedData"] {
            let section = value[key].as_object().unwrap();
            assert_eq!(section.len(), 4);
            assert!(section.values().all(|v| v.is_null()));
        }
        assert!(value["files"].get("RTIS").is_some());
    }

    #[test]
    fn test_json_round_trip() {
        let snapshot = sample_snapshot();
        let json = snapshot.to_json().unwrap();

        assert!(json.contains("\"uploadStatus\""));
        assert!(json.contains("\"success\""));
        assert_eq!(SessionSnapshot::from_json_or_default(&json), snapshot);
    }

    #[test]
    fn test_malformed_json_falls_back_to_default() {
        assert_eq!(
            SessionSnapshot::from_json_or_default("{not json"),
            SessionSnapshot::default()
        );
        assert_eq!(
            SessionSnapshot::from_json_or_default(r#"{"files": {"GPS": null}}"#),
            SessionSnapshot::default()
        );
    }

    #[test]
    fn test_accessors() {
        let snapshot = sample_snapshot();
        assert_eq!(snapshot.status(SchemaId::Cms), Some(UploadStatus::Success));
        assert_eq!(snapshot.status(SchemaId::Rtis), None);
        assert_eq!(snapshot.file(SchemaId::Cms).map(|f| f.size), Some(42));
        assert_eq!(snapshot.data(SchemaId::Cms).map(|d| d.rows), Some(1));
        assert!(snapshot.data(SchemaId::Snt).is_none());
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(temp_dir.path().join("nested").join("session.json"));

        assert!(store.load().await.unwrap().is_none());

        let snapshot = sample_snapshot();
        store.save(&snapshot).await.unwrap();

        assert!(store.path().exists());
        assert!(!store.path().with_extension("json.tmp").exists());
        assert_eq!(store.load().await.unwrap(), Some(snapshot));
    }

    #[tokio::test]
    async fn test_file_store_malformed_contents_load_as_default() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.json");
        tokio::fs::write(&path, "garbage").await.unwrap();

        let store = FileSnapshotStore::new(&path);
        assert_eq!(
            store.load().await.unwrap(),
            Some(SessionSnapshot::default())
        );
    }

    #[tokio::test]
    async fn test_memory_store_counts_saves() {
        let store = MemorySnapshotStore::new();
        assert!(store.load().await.unwrap().is_none());

        store.save(&SessionSnapshot::default()).await.unwrap();
        store.save(&sample_snapshot()).await.unwrap();

        assert_eq!(store.save_count().await, 2);
        assert_eq!(store.current().await, Some(sample_snapshot()));
    }
}
