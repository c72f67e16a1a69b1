//! Dedup store backends for the OctoFHIR loader.
//!
//! This crate provides implementations of the `DedupStore` trait from
//! `octofhir-storage`:
//!
//! - [`InMemoryDedupStore`] - papaya lock-free HashMap, process lifetime
//! - [`FileDedupStore`] - JSON snapshot on disk, survives restarts
//! - [`NoopDedupStore`] - deduplication disabled
//!
//! # Example
//!
//! ```ignore
//! use octofhir_db_memory::{DedupConfig, create_dedup_store};
//!
//! let store = create_dedup_store(&DedupConfig::default()).await?;
//! let seen = store.lookup(&DedupKey::new("Patient", "123")).await?;
//! ```

pub mod factory;
pub mod file;
pub mod storage;

pub use factory::{DedupBackend, DedupConfig, create_dedup_store};
pub use file::FileDedupStore;
pub use octofhir_storage::{DedupStore, DynDedupStore, StorageError};
pub use storage::{InMemoryDedupStore, NoopDedupStore};
