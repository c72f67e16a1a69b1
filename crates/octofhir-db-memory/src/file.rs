//! Dedup store persisted as a JSON snapshot on disk.
//!
//! The snapshot is loaded once before use and written back after every
//! mutation. Writes go to a sibling temp file which is then renamed over the
//! snapshot, so a crash never leaves a truncated file behind.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use octofhir_storage::{ContentHash, DedupKey, DedupStore, StorageError};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

#[derive(Debug, Serialize, Deserialize)]
struct DedupRecord {
    resource_type: String,
    id: String,
    hash: ContentHash,
}

#[derive(Debug)]
pub struct FileDedupStore {
    path: PathBuf,
    records: Mutex<BTreeMap<DedupKey, ContentHash>>,
}

impl FileDedupStore {
    /// Opens the store, loading the snapshot if the file exists.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the file exists but cannot be read and
    /// `StorageError::Serialization` if it is not a valid snapshot.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let records = load_snapshot(&path).await?;
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn load_snapshot(path: &Path) -> Result<BTreeMap<DedupKey, ContentHash>, StorageError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(StorageError::io(path.display().to_string(), e)),
    };

    let records: Vec<DedupRecord> = serde_json::from_slice(&bytes)?;
    Ok(records
        .into_iter()
        .map(|r| (DedupKey::new(r.resource_type, r.id), r.hash))
        .collect())
}

async fn save_snapshot(
    path: &Path,
    records: &BTreeMap<DedupKey, ContentHash>,
) -> Result<(), StorageError> {
    let snapshot: Vec<DedupRecord> = records
        .iter()
        .map(|(key, hash)| DedupRecord {
            resource_type: key.resource_type.clone(),
            id: key.id.clone(),
            hash: hash.clone(),
        })
        .collect();
    let bytes = serde_json::to_vec_pretty(&snapshot)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::io(parent.display().to_string(), e))?;
    }

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|e| StorageError::io(tmp.display().to_string(), e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StorageError::io(path.display().to_string(), e))
}

#[async_trait]
impl DedupStore for FileDedupStore {
    async fn lookup(&self, key: &DedupKey) -> Result<Option<ContentHash>, StorageError> {
        Ok(self.records.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &DedupKey, hash: ContentHash) -> Result<(), StorageError> {
        let mut records = self.records.lock().await;
        records.insert(key.clone(), hash);
        save_snapshot(&self.path, &records).await
    }

    async fn len(&self) -> Result<usize, StorageError> {
        Ok(self.records.lock().await.len())
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_starts_empty() {
        let dir = tempdir().unwrap();
        let store = FileDedupStore::open(dir.path().join("dedup.json")).await.unwrap();
        assert_eq!(store.len().await.unwrap(), 0);
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("dedup.json");
        let key = DedupKey::new("Patient", "p1");

        {
            let store = FileDedupStore::open(&path).await.unwrap();
            store.put(&key, ContentHash::from_hex("abc123")).await.unwrap();
        }

        let reopened = FileDedupStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.lookup(&key).await.unwrap(),
            Some(ContentHash::from_hex("abc123"))
        );
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dedup.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let err = FileDedupStore::open(&path).await.unwrap_err();
        assert!(matches!(err, StorageError::Serialization { .. }));
    }
}
