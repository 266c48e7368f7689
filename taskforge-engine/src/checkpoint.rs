//! File-backed checkpoint store
//!
//! Persists full state snapshots, one JSON record per checkpoint, under a
//! store directory. Checkpoint ids are sequential (`cp-001`, `cp-002`, …)
//! and a `latest` pointer file always names the most recently created
//! record. Checkpoints are append-only: the store never mutates or deletes
//! a record. Restoring hands the snapshot back to the caller, which
//! replaces its live state wholesale — restore is not a merge.
//!
//! Records are written to a temp file and renamed into place, so a crash
//! mid-write can never corrupt an existing checkpoint.

use crate::vcs::VcsAdapter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use taskforge_core::{Error, Result};
use tokio::fs;
use tracing::{debug, info, warn};

const LATEST_FILE: &str = "latest";

/// A persisted checkpoint record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    /// Opaque full state snapshot, never a diff
    pub state: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_revision: Option<String>,
}

/// Lightweight index entry kept in memory for listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointIndexEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

/// Append-only, file-backed checkpoint storage
pub struct CheckpointStore {
    dir: PathBuf,
    /// Sequence number of the most recently created checkpoint
    last_seq: u64,
    latest: Option<String>,
    index: Vec<CheckpointIndexEntry>,
    vcs: Option<Arc<dyn VcsAdapter>>,
}

impl CheckpointStore {
    /// Open (or initialize) a store directory
    ///
    /// Existing records are rescanned so the id sequence and latest
    /// pointer resume where a previous process left off.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;

        let mut store = Self {
            dir,
            last_seq: 0,
            latest: None,
            index: Vec::new(),
            vcs: None,
        };
        store.rescan().await?;
        Ok(store)
    }

    /// Attach a VCS adapter for revision capture and checkout
    pub fn with_vcs(mut self, vcs: Arc<dyn VcsAdapter>) -> Self {
        self.vcs = Some(vcs);
        self
    }

    async fn rescan(&mut self) -> Result<()> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut records: Vec<(u64, CheckpointIndexEntry)> = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(seq) = parse_sequence(&path) else {
                continue;
            };
            match read_record(&path).await {
                Ok(checkpoint) => {
                    records.push((
                        seq,
                        CheckpointIndexEntry {
                            id: checkpoint.id,
                            timestamp: checkpoint.timestamp,
                            description: checkpoint.description,
                        },
                    ));
                }
                Err(e) => {
                    warn!("Skipping unreadable checkpoint {}: {}", path.display(), e);
                }
            }
        }

        records.sort_by_key(|(seq, _)| *seq);
        self.last_seq = records.last().map(|(seq, _)| *seq).unwrap_or(0);
        self.index = records.into_iter().map(|(_, entry)| entry).collect();

        // Prefer the persisted pointer; fall back to the highest sequence
        self.latest = match fs::read_to_string(self.dir.join(LATEST_FILE)).await {
            Ok(raw) => {
                let id = raw.trim().to_string();
                if self.index.iter().any(|entry| entry.id == id) {
                    Some(id)
                } else {
                    self.index.last().map(|entry| entry.id.clone())
                }
            }
            Err(_) => self.index.last().map(|entry| entry.id.clone()),
        };

        if !self.index.is_empty() {
            debug!(
                "Checkpoint store resumed at seq {} ({} records)",
                self.last_seq,
                self.index.len()
            );
        }
        Ok(())
    }

    /// Create a checkpoint from the given full-state snapshot
    ///
    /// Assigns the next sequential id, captures the external revision if a
    /// VCS adapter is attached, writes the record atomically, and moves
    /// the latest pointer.
    pub async fn create(&mut self, description: &str, state: Value) -> Result<String> {
        let seq = self.last_seq + 1;
        let id = format!("cp-{:03}", seq);

        let external_revision = self.vcs.as_ref().and_then(|vcs| vcs.head_revision());
        let checkpoint = Checkpoint {
            id: id.clone(),
            timestamp: Utc::now(),
            description: description.to_string(),
            state,
            external_revision,
        };

        let payload = serde_json::to_vec_pretty(&checkpoint)?;
        write_atomically(&self.record_path(&id), &payload).await?;
        write_atomically(
            &self.dir.join(LATEST_FILE),
            checkpoint.id.as_bytes(),
        )
        .await?;

        self.index.push(CheckpointIndexEntry {
            id: checkpoint.id.clone(),
            timestamp: checkpoint.timestamp,
            description: checkpoint.description.clone(),
        });
        self.latest = Some(id.clone());
        self.last_seq = seq;

        info!("Created checkpoint {}: {}", id, description);
        Ok(id)
    }

    /// Load a checkpoint record, defaulting to the latest
    ///
    /// The caller is responsible for replacing its live state with the
    /// returned snapshot.
    pub async fn restore(&self, checkpoint_id: Option<&str>) -> Result<Checkpoint> {
        let id = match checkpoint_id {
            Some(id) => id.to_string(),
            None => self
                .latest
                .clone()
                .ok_or_else(|| Error::not_found("Checkpoint", "latest"))?,
        };

        let path = self.record_path(&id);
        if !path.exists() {
            return Err(Error::not_found("Checkpoint", id));
        }
        let checkpoint = read_record(&path).await?;
        info!("Loaded checkpoint {}", checkpoint.id);
        Ok(checkpoint)
    }

    /// Index of all checkpoints in creation order
    pub fn list(&self) -> &[CheckpointIndexEntry] {
        &self.index
    }

    /// Id of the most recently created checkpoint
    pub fn latest_id(&self) -> Option<&str> {
        self.latest.as_deref()
    }

    /// Check out the revision a checkpoint recorded, if any
    pub fn checkout_revision(&self, checkpoint: &Checkpoint) -> Result<()> {
        let (Some(vcs), Some(revision)) = (self.vcs.as_ref(), checkpoint.external_revision.as_ref())
        else {
            return Ok(());
        };
        vcs.checkout(revision)
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }
}

impl std::fmt::Debug for CheckpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointStore")
            .field("dir", &self.dir)
            .field("last_seq", &self.last_seq)
            .field("latest", &self.latest)
            .field("records", &self.index.len())
            .finish()
    }
}

/// Extract the sequence number from a `cp-NNN.json` path
fn parse_sequence(path: &Path) -> Option<u64> {
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
        return None;
    }
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.strip_prefix("cp-"))
        .and_then(|seq| seq.parse().ok())
}

async fn read_record(path: &Path) -> Result<Checkpoint> {
    let raw = fs::read(path).await?;
    Ok(serde_json::from_slice(&raw)?)
}

/// Write to a temp file in the same directory, then rename into place
async fn write_atomically(path: &Path, payload: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, payload).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct StubVcs {
        revision: Option<String>,
    }

    impl VcsAdapter for StubVcs {
        fn head_revision(&self) -> Option<String> {
            self.revision.clone()
        }

        fn checkout(&self, _revision: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sequential_ids() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CheckpointStore::open(dir.path()).await.unwrap();

        assert_eq!(store.create("first", json!({"n": 1})).await.unwrap(), "cp-001");
        assert_eq!(store.create("second", json!({"n": 2})).await.unwrap(), "cp-002");
        assert_eq!(store.create("third", json!({"n": 3})).await.unwrap(), "cp-003");
        assert_eq!(store.latest_id(), Some("cp-003"));
        assert_eq!(store.list().len(), 3);
    }

    #[tokio::test]
    async fn test_round_trip_preserves_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CheckpointStore::open(dir.path()).await.unwrap();

        let state = json!({
            "tasks": [{"id": "task-1", "status": "completed"}],
            "completedTaskIds": ["task-1"],
        });
        let id = store.create("before testing phase", state.clone()).await.unwrap();

        let restored = store.restore(Some(&id)).await.unwrap();
        assert_eq!(restored.state, state);
        assert_eq!(restored.description, "before testing phase");
        assert_eq!(restored.id, id);
    }

    #[tokio::test]
    async fn test_restore_defaults_to_latest() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CheckpointStore::open(dir.path()).await.unwrap();

        store.create("first", json!({"n": 1})).await.unwrap();
        store.create("second", json!({"n": 2})).await.unwrap();

        let restored = store.restore(None).await.unwrap();
        assert_eq!(restored.id, "cp-002");
        assert_eq!(restored.state["n"], 2);
    }

    #[tokio::test]
    async fn test_restore_unknown_id_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CheckpointStore::open(dir.path()).await.unwrap();
        store.create("only", json!({})).await.unwrap();

        let err = store.restore(Some("cp-999")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_restore_from_empty_store_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).await.unwrap();
        let err = store.restore(None).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_reopen_resumes_sequence_and_latest() {
        let dir = tempfile::tempdir().unwrap();

        {
            let mut store = CheckpointStore::open(dir.path()).await.unwrap();
            store.create("first", json!({"n": 1})).await.unwrap();
            store.create("second", json!({"n": 2})).await.unwrap();
        }
        // Store dropped, simulating process exit

        let mut store = CheckpointStore::open(dir.path()).await.unwrap();
        assert_eq!(store.latest_id(), Some("cp-002"));
        assert_eq!(store.list().len(), 2);

        let id = store.create("after restart", json!({"n": 3})).await.unwrap();
        assert_eq!(id, "cp-003");
    }

    #[tokio::test]
    async fn test_vcs_revision_is_captured() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CheckpointStore::open(dir.path())
            .await
            .unwrap()
            .with_vcs(Arc::new(StubVcs {
                revision: Some("abc123".to_string()),
            }));

        let id = store.create("tagged", json!({})).await.unwrap();
        let restored = store.restore(Some(&id)).await.unwrap();
        assert_eq!(restored.external_revision.as_deref(), Some("abc123"));
        store.checkout_revision(&restored).unwrap();
    }

    #[tokio::test]
    async fn test_no_vcs_means_no_revision() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CheckpointStore::open(dir.path()).await.unwrap();

        let id = store.create("untagged", json!({})).await.unwrap();
        let restored = store.restore(Some(&id)).await.unwrap();
        assert!(restored.external_revision.is_none());
        // Checkout without an adapter is a silent no-op
        store.checkout_revision(&restored).unwrap();
    }

    #[tokio::test]
    async fn test_record_shape_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CheckpointStore::open(dir.path()).await.unwrap();
        let id = store.create("shape", json!({"k": "v"})).await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join(format!("{}.json", id))).unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["id"], "cp-001");
        assert_eq!(value["description"], "shape");
        assert_eq!(value["state"]["k"], "v");
        assert!(value.get("timestamp").is_some());
        // Absent revision is omitted, not null
        assert!(value.get("externalRevision").is_none());

        let pointer = std::fs::read_to_string(dir.path().join("latest")).unwrap();
        assert_eq!(pointer.trim(), "cp-001");
    }
}
