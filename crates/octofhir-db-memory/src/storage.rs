use async_trait::async_trait;
use octofhir_storage::{ContentHash, DedupKey, DedupStore, StorageError};
use papaya::HashMap as PapayaHashMap;

/// In-memory dedup store using papaya lock-free HashMap.
///
/// Records live for the lifetime of the process. Concurrent access to distinct
/// keys never blocks.
#[derive(Debug, Default)]
pub struct InMemoryDedupStore {
    pub(crate) data: PapayaHashMap<DedupKey, ContentHash>,
}

impl InMemoryDedupStore {
    pub fn new() -> Self {
        Self {
            data: PapayaHashMap::new(),
        }
    }
}

#[async_trait]
impl DedupStore for InMemoryDedupStore {
    async fn lookup(&self, key: &DedupKey) -> Result<Option<ContentHash>, StorageError> {
        let guard = self.data.pin();
        Ok(guard.get(key).cloned())
    }

    async fn put(&self, key: &DedupKey, hash: ContentHash) -> Result<(), StorageError> {
        let guard = self.data.pin();
        guard.insert(key.clone(), hash);
        Ok(())
    }

    async fn len(&self) -> Result<usize, StorageError> {
        Ok(self.data.pin().len())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Dedup store that never remembers anything; every resource is published.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDedupStore;

#[async_trait]
impl DedupStore for NoopDedupStore {
    async fn lookup(&self, _key: &DedupKey) -> Result<Option<ContentHash>, StorageError> {
        Ok(None)
    }

    async fn put(&self, _key: &DedupKey, _hash: ContentHash) -> Result<(), StorageError> {
        Ok(())
    }

    async fn len(&self) -> Result<usize, StorageError> {
        Ok(0)
    }

    fn backend_name(&self) -> &'static str {
        "none"
    }
}
