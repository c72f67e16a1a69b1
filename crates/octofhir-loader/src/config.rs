use octofhir_db_memory::{DedupBackend, DedupConfig};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoaderConfig {
    #[serde(default)]
    pub publisher: PublisherSettings,
    #[serde(default)]
    pub input: InputSettings,
    #[serde(default)]
    pub dedup: DedupSettings,
    /// Upstream server credentials
    #[serde(default)]
    pub auth: AuthSettings,
    /// Polling import service (`watch` command)
    #[serde(default)]
    pub import_service: ImportServiceSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl LoaderConfig {
    pub fn validate(&self) -> Result<(), String> {
        let p = &self.publisher;
        if p.fhir_server_url.trim().is_empty() {
            return Err("publisher.fhir_server_url must not be empty".into());
        }
        url::Url::parse(&p.fhir_server_url)
            .map_err(|e| format!("publisher.fhir_server_url is not a valid URL: {e}"))?;
        if p.max_parallelism == 0 {
            return Err("publisher.max_parallelism must be > 0".into());
        }
        if p.median_first_retry_delay_ms == 0 {
            return Err("publisher.median_first_retry_delay_ms must be > 0".into());
        }
        if p.max_retry_delay_ms < p.median_first_retry_delay_ms {
            return Err(
                "publisher.max_retry_delay_ms must be >= publisher.median_first_retry_delay_ms"
                    .into(),
            );
        }
        if p.request_timeout_ms == 0 {
            return Err("publisher.request_timeout_ms must be > 0".into());
        }
        if p.metrics_refresh_interval_ms == 0 {
            return Err("publisher.metrics_refresh_interval_ms must be > 0".into());
        }
        if p.max_entries_per_bundle == 0 {
            return Err("publisher.max_entries_per_bundle must be > 0".into());
        }
        if self.dedup.backend == DedupBackend::File && self.dedup.path.is_none() {
            return Err("dedup.backend = \"file\" requires dedup.path".into());
        }
        if self.import_service.polling_interval_ms == 0 {
            return Err("import_service.polling_interval_ms must be > 0".into());
        }
        self.auth
            .validate()
            .map_err(|e| format!("auth config error: {e}"))?;
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retry_count: self.publisher.max_retry_count,
            median_first_retry_delay: Duration::from_millis(
                self.publisher.median_first_retry_delay_ms,
            ),
            max_retry_delay: Duration::from_millis(self.publisher.max_retry_delay_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.publisher.request_timeout_ms)
    }

    pub fn metrics_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.publisher.metrics_refresh_interval_ms)
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.import_service.polling_interval_ms)
    }

    /// Effective configuration as TOML, with credentials masked.
    pub fn to_toml(&self) -> Result<String, String> {
        let mut shown = self.clone();
        for secret in [
            &mut shown.auth.token,
            &mut shown.auth.password,
            &mut shown.auth.client_secret,
        ] {
            if secret.is_some() {
                *secret = Some("***".into());
            }
        }
        toml::to_string_pretty(&shown).map_err(|e| format!("config serialize error: {e}"))
    }

    pub fn dedup_config(&self) -> DedupConfig {
        DedupConfig {
            backend: self.dedup.backend,
            path: self.dedup.path.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherSettings {
    /// Base URL of the upstream FHIR server
    #[serde(default = "default_fhir_server_url")]
    pub fhir_server_url: String,
    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: usize,
    #[serde(default = "default_max_retry_count")]
    pub max_retry_count: u32,
    #[serde(default = "default_median_first_retry_delay_ms")]
    pub median_first_retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_metrics_refresh_interval_ms")]
    pub metrics_refresh_interval_ms: u64,
    /// Audit artifacts land here; recreated on every run
    #[serde(default = "default_output_directory")]
    pub output_directory: PathBuf,
    /// Soft limit, exceeding it only logs a warning
    #[serde(default = "default_max_entries_per_bundle")]
    pub max_entries_per_bundle: usize,
    /// Log upstream error bodies
    #[serde(default)]
    pub verbose: bool,
}

fn default_fhir_server_url() -> String {
    "http://localhost:8080/fhir".into()
}
fn default_max_parallelism() -> usize {
    16
}
fn default_max_retry_count() -> u32 {
    3
}
fn default_median_first_retry_delay_ms() -> u64 {
    1_000
}
fn default_max_retry_delay_ms() -> u64 {
    60_000
}
fn default_request_timeout_ms() -> u64 {
    30_000
}
fn default_metrics_refresh_interval_ms() -> u64 {
    5_000
}
fn default_output_directory() -> PathBuf {
    PathBuf::from("output")
}
fn default_max_entries_per_bundle() -> usize {
    octofhir_core::DEFAULT_MAX_ENTRIES_PER_BUNDLE
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            fhir_server_url: default_fhir_server_url(),
            max_parallelism: default_max_parallelism(),
            max_retry_count: default_max_retry_count(),
            median_first_retry_delay_ms: default_median_first_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            metrics_refresh_interval_ms: default_metrics_refresh_interval_ms(),
            output_directory: default_output_directory(),
            max_entries_per_bundle: default_max_entries_per_bundle(),
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSettings {
    /// Directory holding `*.ndjson` bundle files
    #[serde(default = "default_input_directory")]
    pub directory: PathBuf,
}

fn default_input_directory() -> PathBuf {
    PathBuf::from("input")
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            directory: default_input_directory(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DedupSettings {
    #[serde(default)]
    pub backend: DedupBackend,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    #[default]
    None,
    Bearer,
    Basic,
    ClientCredentials,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthSettings {
    #[serde(default)]
    pub method: AuthMethod,
    /// Static token for `bearer`
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Token endpoint for `client_credentials`
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}

impl AuthSettings {
    pub fn validate(&self) -> Result<(), String> {
        match self.method {
            AuthMethod::None => Ok(()),
            AuthMethod::Bearer if is_blank(&self.token) => {
                Err("method = \"bearer\" requires auth.token".into())
            }
            AuthMethod::Basic if is_blank(&self.username) => {
                Err("method = \"basic\" requires auth.username".into())
            }
            AuthMethod::ClientCredentials
                if is_blank(&self.token_url)
                    || is_blank(&self.client_id)
                    || is_blank(&self.client_secret) =>
            {
                Err(
                    "method = \"client_credentials\" requires token_url, client_id and client_secret"
                        .into(),
                )
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportServiceSettings {
    #[serde(default = "default_import_directory")]
    pub import_directory: PathBuf,
    #[serde(default = "default_rejected_directory")]
    pub rejected_directory: PathBuf,
    #[serde(default = "default_polling_interval_ms")]
    pub polling_interval_ms: u64,
}

fn default_import_directory() -> PathBuf {
    PathBuf::from("import")
}
fn default_rejected_directory() -> PathBuf {
    PathBuf::from("rejected")
}
fn default_polling_interval_ms() -> u64 {
    15_000
}

impl Default for ImportServiceSettings {
    fn default() -> Self {
        Self {
            import_directory: default_import_directory(),
            rejected_directory: default_rejected_directory(),
            polling_interval_ms: default_polling_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::LoaderConfig;
    use config::{Config, Environment, File};
    use std::path::{Path, PathBuf};

    /// Default configuration file, looked up in the working directory.
    pub const DEFAULT_CONFIG_FILE: &str = "octofhir-loader.toml";

    pub fn load_config(path: Option<&str>) -> Result<LoaderConfig, String> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if !pathbuf.exists() {
                    return Err(format!("config file not found: {p}"));
                }
                builder = builder.add_source(File::from(pathbuf));
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // Environment variable overrides, e.g., OCTOFHIR_LOADER__PUBLISHER__MAX_PARALLELISM=8
        builder = builder.add_source(
            Environment::with_prefix("OCTOFHIR_LOADER")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: LoaderConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }

    pub fn load_config_with_default_path<P: AsRef<Path>>(
        path: Option<P>,
    ) -> Result<LoaderConfig, String> {
        let p = path
            .as_ref()
            .map(|p| p.as_ref().to_string_lossy().to_string());
        load_config(p.as_deref())
    }
}
