//! Batch publish run over a directory of NDJSON bundle files.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use octofhir_core::{Bundle, CoreError, Validator, resolve};
use octofhir_db_memory::create_dedup_store;
use octofhir_storage::DynDedupStore;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::audit::AuditWriter;
use crate::auth::resolve_auth;
use crate::client::{FhirClient, UpstreamStore};
use crate::config::LoaderConfig;
use crate::error::{ClientError, LoaderError, Result};
use crate::metrics::MetricsCollector;
use crate::observability::Observability;
use crate::publisher::{PublishWorkerPool, PublisherContext, WorkItem};

pub const INPUT_EXTENSION: &str = "ndjson";

/// Summary of one publish run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub files: usize,
    pub valid_lines: usize,
    pub invalid_lines: usize,
    pub submitted: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Backoff waits taken before retrying a request
    pub retries: usize,
    pub elapsed: Duration,
    pub events_per_second: f64,
    pub success: bool,
    pub output_path: PathBuf,
}

/// Builds the HTTP upstream client from configuration, acquiring credentials first.
///
/// # Errors
///
/// Any failure here is a `LoaderError::Configuration`.
pub async fn connect_upstream(config: &LoaderConfig) -> Result<Arc<dyn UpstreamStore>> {
    let http = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .map_err(|e| LoaderError::configuration(ClientError::Build(e).to_string()))?;
    let auth = resolve_auth(&config.auth, &http).await?;
    let client = FhirClient::with_http(http, &config.publisher.fhir_server_url, auth);
    info!(server = %client.base_url(), "Upstream FHIR server configured");
    Ok(Arc::new(client))
}

/// Opens the configured dedup backend.
pub async fn open_dedup_store(config: &LoaderConfig) -> Result<DynDedupStore> {
    let store = create_dedup_store(&config.dedup_config())
        .await
        .map_err(|e| LoaderError::configuration(format!("dedup store: {e}")))?;
    debug!(backend = store.backend_name(), "Dedup store opened");
    Ok(store)
}

/// Turns one bundle document into work items.
///
/// Parse (including invalid UTF-8), validation and resolution failures reject
/// the whole document.
pub fn prepare_bundle(
    raw: &[u8],
    validator: &Validator,
) -> std::result::Result<Vec<WorkItem>, CoreError> {
    let mut bundle = Bundle::parse(raw)?;

    let report = validator.validate(bundle.as_value());
    for warning in report.warnings() {
        warn!(issue = %warning, "Bundle validation warning");
    }
    if !report.ok {
        let errors: Vec<String> = report.errors().map(|i| i.message.clone()).collect();
        return Err(CoreError::invalid_resource(errors.join("; ")));
    }

    let stats = resolve(&mut bundle)?;
    debug!(
        rewritten = stats.rewritten,
        unresolved = stats.unresolved_local,
        "Bundle references resolved"
    );

    bundle
        .into_resources()?
        .into_iter()
        .map(WorkItem::from_resource)
        .collect()
}

pub struct PipelineOrchestrator {
    config: LoaderConfig,
    observability: Arc<Observability>,
    upstream: Arc<dyn UpstreamStore>,
    dedup: DynDedupStore,
    metrics: Arc<MetricsCollector>,
    validator: Validator,
}

impl PipelineOrchestrator {
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

    /// Wires the orchestrator to the configured upstream server and dedup backend.
    pub async fn connect(config: LoaderConfig, observability: Arc<Observability>) -> Result<Self> {
        let upstream = connect_upstream(&config).await?;
        let dedup = open_dedup_store(&config).await?;
        Ok(Self::new(config, observability, upstream, dedup))
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Publishes every bundle line of every input file and waits for the pool to drain.
    ///
    /// # Errors
    ///
    /// Fails before any publish attempt when the input directory is missing or
    /// the audit directory cannot be recreated. Per-line and per-entry failures
    /// are counted in the report instead.
    pub async fn run(&self) -> Result<RunReport> {
        let input_dir = &self.config.input.directory;
        if !tokio::fs::try_exists(input_dir).await.unwrap_or(false) {
            return Err(LoaderError::configuration(format!(
                "input directory {} does not exist",
                input_dir.display()
            )));
        }
        let files = list_files(input_dir, INPUT_EXTENSION).await?;

        let audit = Arc::new(AuditWriter::recreate(&self.config.publisher.output_directory).await?);

        self.metrics.reset();
        self.metrics.start(self.config.metrics_refresh_interval());

        let pool = PublishWorkerPool::start(PublisherContext {
            upstream: self.upstream.clone(),
            dedup: self.dedup.clone(),
            metrics: self.metrics.clone(),
            audit: audit.clone(),
            observability: self.observability.clone(),
            retry: self.config.retry_policy(),
            max_parallelism: self.config.publisher.max_parallelism,
        });

        info!(
            run_id = %self.observability.run_id(),
            files = files.len(),
            input = %input_dir.display(),
            "Starting publish run"
        );

        let mut valid_lines = 0usize;
        let mut invalid_lines = 0usize;
        let mut feed_error = None;

        'files: for path in &files {
            let file = match tokio::fs::File::open(path).await {
                Ok(f) => f,
                Err(e) => {
                    feed_error = Some(LoaderError::io(path, e));
                    break;
                }
            };
            let mut reader = BufReader::new(file);
            let mut line = Vec::new();
            let mut line_no = 0usize;

            loop {
                // Raw bytes: an undecodable line is rejected by the parser, not the reader.
                line.clear();
                match reader.read_until(b'\n', &mut line).await {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(e) => {
                        feed_error = Some(LoaderError::io(path, e));
                        break 'files;
                    }
                }
                line_no += 1;
                if line.trim_ascii().is_empty() {
                    continue;
                }

                match prepare_bundle(&line, &self.validator) {
                    Ok(items) => {
                        valid_lines += 1;
                        for item in items {
                            if let Err(e) = pool.submit(item) {
                                feed_error = Some(e);
                                break 'files;
                            }
                        }
                    }
                    Err(e) => {
                        invalid_lines += 1;
                        warn!(
                            file = %path.display(),
                            line = line_no,
                            category = %e.category(),
                            error = %e,
                            "Skipping invalid bundle"
                        );
                    }
                }
            }
        }

        let pool_report = pool.complete().await;
        self.metrics.stop();
        let pool_report = pool_report?;
        if let Some(e) = feed_error {
            return Err(e);
        }

        let obs = &self.observability;
        obs.track_metric("PublisherProcessValidLines", valid_lines as f64);
        obs.track_metric("PublisherProcessInvalidLines", invalid_lines as f64);
        obs.track_metric("PublisherProcessResourceFiles", files.len() as f64);

        let report = RunReport {
            files: files.len(),
            valid_lines,
            invalid_lines,
            submitted: pool_report.submitted,
            succeeded: pool_report.succeeded(),
            skipped: pool_report.skipped,
            failed: pool_report.failed,
            retries: pool_report.retries,
            elapsed: self.metrics.elapsed(),
            events_per_second: self.metrics.events_per_second(),
            success: pool_report.is_success(),
            output_path: audit.dir().to_path_buf(),
        };

        info!(
            "Total success requests: {} of {} in {:?}",
            report.succeeded, report.submitted, report.elapsed
        );
        Ok(report)
    }
}

/// Files in `dir` with the given extension, sorted by name.
pub(crate) async fn list_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| LoaderError::io(dir, e))?;
    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| LoaderError::io(dir, e))?
    {
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == extension) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prepare_bundle_resolves_before_fan_out() {
        let line = json!({
            "resourceType": "Bundle",
            "entry": [
                {"fullUrl": "urn:uuid:abc", "resource": {"resourceType": "Patient", "id": "123"}},
                {"fullUrl": "urn:uuid:obs", "resource": {
                    "resourceType": "Observation",
                    "id": "o1",
                    "subject": {"reference": "urn:uuid:abc"}
                }}
            ]
        })
        .to_string();

        let items = prepare_bundle(line.as_bytes(), &Validator::default()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].resource()["subject"]["reference"], "Patient/123");
        assert!(items.iter().all(WorkItem::has_persisted_id));
    }

    #[test]
    fn test_prepare_bundle_rejections() {
        let v = Validator::default();
        assert!(prepare_bundle(b"{not json", &v).unwrap_err().is_parse_error());
        assert!(
            prepare_bundle(b"{\"resourceType\": \"Bundle\", \"id\": \"\xff\"}", &v)
                .unwrap_err()
                .is_parse_error()
        );

        let no_entries = json!({"resourceType": "Bundle"}).to_string();
        assert!(matches!(
            prepare_bundle(no_entries.as_bytes(), &v),
            Err(CoreError::InvalidResource { .. })
        ));

        let missing_id = json!({"resourceType": "Bundle", "entry": [
            {"fullUrl": "urn:uuid:1", "resource": {"resourceType": "Patient"}}
        ]})
        .to_string();
        assert!(matches!(
            prepare_bundle(missing_id.as_bytes(), &v),
            Err(CoreError::UnresolvableEntry { index: 0, field: "id" })
        ));
    }

    #[tokio::test]
    async fn test_list_files_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.ndjson", "a.ndjson", "notes.txt", "c.json"] {
            tokio::fs::write(dir.path().join(name), b"").await.unwrap();
        }
        let files = list_files(dir.path(), INPUT_EXTENSION).await.unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.ndjson", "b.ndjson"]);
    }
}
