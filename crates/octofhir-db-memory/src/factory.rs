use std::path::PathBuf;
use std::sync::Arc;

use octofhir_storage::{DynDedupStore, StorageError};
use serde::{Deserialize, Serialize};

use crate::{FileDedupStore, InMemoryDedupStore, NoopDedupStore};

/// Supported dedup backend types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupBackend {
    /// Deduplication disabled
    None,
    /// Process-lifetime papaya::HashMap
    #[default]
    Memory,
    /// JSON snapshot file, survives restarts
    File,
}

impl std::str::FromStr for DedupBackend {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            other => Err(StorageError::unsupported_backend(other)),
        }
    }
}

/// Factory configuration to construct a dedup store.
#[derive(Debug, Clone, Default)]
pub struct DedupConfig {
    pub backend: DedupBackend,
    /// Snapshot location, required by the file backend
    pub path: Option<PathBuf>,
}

/// Create a dedup store based on the provided configuration.
///
/// # Errors
///
/// Returns `StorageError::UnsupportedBackend` when the file backend has no path,
/// or any error raised while loading the snapshot.
pub async fn create_dedup_store(config: &DedupConfig) -> Result<DynDedupStore, StorageError> {
    match config.backend {
        DedupBackend::None => Ok(Arc::new(NoopDedupStore)),
        DedupBackend::Memory => Ok(Arc::new(InMemoryDedupStore::new())),
        DedupBackend::File => {
            let path = config
                .path
                .clone()
                .ok_or_else(|| StorageError::unsupported_backend("file (no path configured)"))?;
            Ok(Arc::new(FileDedupStore::open(path).await?))
        }
    }
}
