//! # octofhir-storage
//!
//! Deduplication store abstraction for the OctoFHIR loader.
//!
//! This crate defines the [`DedupStore`] contract and the record types it works
//! with. Concrete backends live in `octofhir-db-memory`.
//!
//! ## Overview
//!
//! Before publishing a resource the loader hashes its canonical serialization
//! with [`content_hash`] and compares it with the hash stored under the
//! resource's [`DedupKey`]. Equal hashes mean the same content was already
//! published and the request is skipped.
//!
//! ## Example
//!
//! ```ignore
//! use octofhir_storage::{DedupKey, DedupStore, content_hash};
//!
//! async fn remember(store: &dyn DedupStore, id: &str, resource: &Value) -> Result<(), StorageError> {
//!     let key = DedupKey::new("Patient", id);
//!     store.put(&key, content_hash(resource)).await
//! }
//! ```

mod error;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use traits::DedupStore;
pub use types::{ContentHash, DedupKey, content_hash};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shared dedup store trait object.
pub type DynDedupStore = std::sync::Arc<dyn DedupStore>;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{ErrorCategory, StorageError};
    pub use crate::traits::DedupStore;
    pub use crate::types::{ContentHash, DedupKey, content_hash};
    pub use crate::{DynDedupStore, StorageResult};
}
