//! Polling import service: one bundle per `*.json` file dropped into a directory.
//!
//! A file whose bundle is rejected is moved aside. A file whose entries all
//! publish is deleted. Anything else stays put and is picked up again on the
//! next poll, which gives at-least-once delivery.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use octofhir_core::Validator;
use octofhir_storage::DynDedupStore;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::audit::AuditWriter;
use crate::client::UpstreamStore;
use crate::config::LoaderConfig;
use crate::error::{LoaderError, Result};
use crate::metrics::MetricsCollector;
use crate::observability::Observability;
use crate::pipeline::{connect_upstream, list_files, open_dedup_store, prepare_bundle};
use crate::publisher::{PublishWorkerPool, PublisherContext};

pub const IMPORT_EXTENSION: &str = "json";

/// What happened to the files seen in one poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollSummary {
    /// Published completely and deleted
    pub imported: usize,
    /// Moved to the rejected directory
    pub rejected: usize,
    /// Left for the next poll
    pub retained: usize,
}

pub struct ImportService {
    config: LoaderConfig,
    observability: Arc<Observability>,
    upstream: Arc<dyn UpstreamStore>,
    dedup: DynDedupStore,
    metrics: Arc<MetricsCollector>,
    validator: Validator,
}

impl ImportService {
    pub fn new(
        config: LoaderConfig,
        observability: Arc<Observability>,
        upstream: Arc<dyn UpstreamStore>,
        dedup: DynDedupStore,
    ) -> Self {
        let metrics = Arc::new(MetricsCollector::new(observability.clone()));
        let validator = Validator::new(config.publisher.max_entries_per_bundle);
        Self {
            config,
            observability,
            upstream,
            dedup,
            metrics,
            validator,
        }
    }

    pub async fn connect(config: LoaderConfig, observability: Arc<Observability>) -> Result<Self> {
        let upstream = connect_upstream(&config).await?;
        let dedup = open_dedup_store(&config).await?;
        Ok(Self::new(config, observability, upstream, dedup))
    }

    /// Polls until `shutdown` turns true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let settings = &self.config.import_service;
        tokio::fs::create_dir_all(&settings.import_directory)
            .await
            .map_err(|e| LoaderError::io(&settings.import_directory, e))?;
        let audit = Arc::new(AuditWriter::open(&self.config.publisher.output_directory).await?);

        info!(
            directory = %settings.import_directory.display(),
            interval = ?self.config.polling_interval(),
            "Import service started"
        );
        self.metrics.start(self.config.metrics_refresh_interval());

        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.poll_with(&audit).await {
                Ok(summary) if summary != PollSummary::default() => {
                    info!(
                        imported = summary.imported,
                        rejected = summary.rejected,
                        retained = summary.retained,
                        "Import poll finished"
                    );
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "Import poll failed"),
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.polling_interval()) => {}
            }
        }

        self.metrics.stop();
        info!("Import service stopped");
        Ok(())
    }

    /// Processes every file currently waiting in the import directory once.
    pub async fn process_once(&self) -> Result<PollSummary> {
        let dir = &self.config.import_service.import_directory;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| LoaderError::io(dir, e))?;
        let audit = AuditWriter::open(&self.config.publisher.output_directory).await?;
        self.poll_with(&Arc::new(audit)).await
    }

    async fn poll_with(&self, audit: &Arc<AuditWriter>) -> Result<PollSummary> {
        let dir = &self.config.import_service.import_directory;
        let mut summary = PollSummary::default();

        for path in list_files(dir, IMPORT_EXTENSION).await? {
            match self.import_file(&path, audit).await {
                Ok(FileOutcome::Imported) => summary.imported += 1,
                Ok(FileOutcome::Rejected) => summary.rejected += 1,
                Ok(FileOutcome::Retained) => summary.retained += 1,
                Err(e) => {
                    // One unreadable file must not hold up the files behind it.
                    error!(file = %path.display(), error = %e, "Import of file failed");
                    summary.retained += 1;
                }
            }
        }
        Ok(summary)
    }

    async fn import_file(&self, path: &Path, audit: &Arc<AuditWriter>) -> Result<FileOutcome> {
        let raw = tokio::fs::read(path)
            .await
            .map_err(|e| LoaderError::io(path, e))?;

        let items = match prepare_bundle(&raw, &self.validator) {
            Ok(items) => items,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Rejecting bundle file");
                self.observability.track_metric("ImportServiceRejectedFiles", 1.0);
                move_to(path, &self.config.import_service.rejected_directory).await?;
                return Ok(FileOutcome::Rejected);
            }
        };

        let pool = PublishWorkerPool::start(PublisherContext {
            upstream: self.upstream.clone(),
            dedup: self.dedup.clone(),
            metrics: self.metrics.clone(),
            audit: audit.clone(),
            observability: self.observability.clone(),
            retry: self.config.retry_policy(),
            max_parallelism: self.config.publisher.max_parallelism,
        });
        for item in items {
            pool.submit(item)?;
        }
        let report = pool.complete().await?;

        if report.is_success() {
            tokio::fs::remove_file(path)
                .await
                .map_err(|e| LoaderError::io(path, e))?;
            Ok(FileOutcome::Imported)
        } else {
            warn!(
                file = %path.display(),
                failed = report.failed,
                "Bundle file kept for redelivery"
            );
            Ok(FileOutcome::Retained)
        }
    }
}

enum FileOutcome {
    Imported,
    Rejected,
    Retained,
}

async fn move_to(path: &Path, dir: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| LoaderError::io(dir, e))?;
    let target = match path.file_name() {
        Some(name) => dir.join(name),
        None => return Err(LoaderError::configuration(format!("not a file: {}", path.display()))),
    };
    tokio::fs::rename(path, &target)
        .await
        .map_err(|e| LoaderError::io(path, e))?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_move_to_creates_target_directory() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("bundle.json");
        tokio::fs::write(&file, b"{}").await.unwrap();

        let target = move_to(&file, &root.path().join("rejected")).await.unwrap();
        assert!(!file.exists());
        assert!(target.exists());
        assert_eq!(target, root.path().join("rejected").join("bundle.json"));
    }
}
