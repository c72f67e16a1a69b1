// Tracing initialization with a reloadable log level, plus the per-process
// observability context handed to the pipeline components.
use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

static LOG_RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, tracing_subscriber::Registry>> =
    OnceLock::new();

pub fn init_tracing() {
    init_tracing_with_level("info");
}

pub fn init_tracing_with_level(level: &str) {
    // Prefer RUST_LOG from env, otherwise use provided level string.
    let base_filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level));

    let (reload_layer, handle) = reload::Layer::new(base_filter);
    let _ = LOG_RELOAD_HANDLE.set(handle);

    let _ = tracing_subscriber::registry()
        .with(reload_layer)
        .with(fmt::layer().with_target(false))
        .try_init();
}

/// Apply a new logging level at runtime if reload handle is configured.
///
/// An explicit RUST_LOG keeps precedence over the configured level.
pub fn apply_logging_level(level: &str) {
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }
    if let Some(handle) = LOG_RELOAD_HANDLE.get() {
        let _ = handle.modify(|f| {
            *f = EnvFilter::new(level);
        });
    }
}

/// Context shared by the orchestrator, worker pool and metrics collector.
///
/// Built once per process and passed around behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Observability {
    run_id: String,
    verbose: bool,
}

impl Observability {
    pub fn new(verbose: bool) -> Self {
        Self {
            run_id: octofhir_core::generate_id(),
            verbose,
        }
    }

    pub fn with_run_id(run_id: impl Into<String>, verbose: bool) -> Self {
        Self {
            run_id: run_id.into(),
            verbose,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Whether upstream error bodies should be logged.
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Emits a named numeric metric as a structured event.
    pub fn track_metric(&self, name: &str, value: f64) {
        tracing::info!(
            target: "octofhir_loader::telemetry",
            run_id = %self.run_id,
            metric = name,
            value,
            "metric"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_ids_differ_per_context() {
        let a = Observability::new(false);
        let b = Observability::new(true);
        assert_ne!(a.run_id(), b.run_id());
        assert!(b.verbose());
    }

    #[test]
    fn test_track_metric_without_subscriber() {
        let obs = Observability::with_run_id("run-1", false);
        obs.track_metric("PublisherProcessValidLines", 3.0);
        assert_eq!(obs.run_id(), "run-1");
    }
}
