//! Publishing pipeline for FHIR bundles.
//!
//! Reads bundle documents from disk, rewrites bundle-local references, and
//! publishes each entry to an upstream FHIR server through a bounded worker
//! pool with jittered retries, duplicate suppression and an on-disk audit trail.

pub mod audit;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod import_service;
pub mod metrics;
pub mod observability;
pub mod pipeline;
pub mod publisher;
pub mod retry;

pub use audit::{AuditError, AuditWriter, OUTCOMES_FILE};
pub use client::{FhirClient, UpstreamResponse, UpstreamStore};
pub use config::LoaderConfig;
pub use error::{ClientError, LoaderError, PublishError, Result};
pub use import_service::{ImportService, PollSummary};
pub use metrics::MetricsCollector;
pub use observability::{Observability, apply_logging_level, init_tracing, init_tracing_with_level};
pub use pipeline::{PipelineOrchestrator, RunReport};
pub use publisher::{
    OutcomeKind, PoolReport, PublishOutcome, PublishWorkerPool, PublisherContext, WorkItem,
};
pub use retry::RetryPolicy;
