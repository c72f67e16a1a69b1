use async_trait::async_trait;

use crate::error::StorageError;
use crate::types::{ContentHash, DedupKey};

/// Persisted record of the last content hash published per resource.
///
/// Backends must give read-then-write consistency per key as seen by a single
/// caller. Distinct keys may be accessed concurrently without coordination.
///
/// # Example
///
/// ```ignore
/// use octofhir_storage::{DedupStore, DedupKey, content_hash};
///
/// async fn is_duplicate(store: &dyn DedupStore, id: &str, resource: &Value) -> Result<bool, StorageError> {
///     let key = DedupKey::new("Patient", id);
///     Ok(store.lookup(&key).await? == Some(content_hash(resource)))
/// }
/// ```
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Returns the stored hash for the key, if any.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues, not for missing records.
    async fn lookup(&self, key: &DedupKey) -> Result<Option<ContentHash>, StorageError>;

    /// Inserts or replaces the hash for the key.
    ///
    /// Callers invoke this only after the upstream write succeeded.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if a persisted backend fails to save.
    async fn put(&self, key: &DedupKey, hash: ContentHash) -> Result<(), StorageError>;

    /// Number of records currently held.
    async fn len(&self) -> Result<usize, StorageError>;

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}
