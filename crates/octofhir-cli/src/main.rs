mod cli;
mod commands;
mod output;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use octofhir_loader::config::loader::{DEFAULT_CONFIG_FILE, load_config_with_default_path};
use octofhir_loader::{LoaderConfig, LoaderError, observability};

use cli::{Cli, Commands};
use output::print_error;

const EXIT_RUN_FAILED: u8 = 1;
const EXIT_CONFIGURATION: u8 = 2;

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config
    CliArgument,
    /// From OCTOFHIR_LOADER_CONFIG
    EnvironmentVariable,
    /// octofhir-loader.toml in the working directory, if present
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (OCTOFHIR_LOADER_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    observability::init_tracing();

    let cli = Cli::parse();
    let (config_path, source) = resolve_config_path(cli.config.clone());

    let mut cfg = match load_config_with_default_path(config_path.as_ref()) {
        Ok(c) => c,
        Err(e) => {
            print_error(&format!("Configuration error: {e}"));
            return ExitCode::from(EXIT_CONFIGURATION);
        }
    };
    tracing::info!(
        path = %config_path.as_deref().unwrap_or(Path::new(DEFAULT_CONFIG_FILE)).display(),
        source = %source,
        "Configuration loaded"
    );

    if let Commands::Publish(args) = &cli.command {
        commands::publish::apply_overrides(&mut cfg, args);
        if let Err(e) = cfg.validate() {
            print_error(&format!("Configuration error: {e}"));
            return ExitCode::from(EXIT_CONFIGURATION);
        }
    }
    observability::apply_logging_level(&cfg.logging.level);

    match run(cli.command, cfg).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_RUN_FAILED),
        Err(e) => {
            print_error(&format!("{e:#}"));
            let configuration = e
                .downcast_ref::<LoaderError>()
                .is_some_and(LoaderError::is_configuration);
            if configuration {
                ExitCode::from(EXIT_CONFIGURATION)
            } else {
                ExitCode::from(EXIT_RUN_FAILED)
            }
        }
    }
}

/// Returns whether the command succeeded.
async fn run(command: Commands, cfg: LoaderConfig) -> anyhow::Result<bool> {
    match command {
        Commands::Publish(args) => {
            let report = commands::publish::publish(cfg, args.json).await?;
            Ok(report.success)
        }
        Commands::Watch(args) => commands::watch::watch(cfg, args.once).await,
        Commands::Config => {
            commands::config::show(&cfg)?;
            Ok(true)
        }
    }
}

/// Resolve the configuration file path.
///
/// Priority order:
/// 1. CLI argument: --config <path>
/// 2. Environment variable: OCTOFHIR_LOADER_CONFIG
/// 3. Default: octofhir-loader.toml, skipped when absent
fn resolve_config_path(explicit: Option<PathBuf>) -> (Option<PathBuf>, ConfigSource) {
    let Some(path) = explicit else {
        return (None, ConfigSource::Default);
    };
    let from_env = std::env::var_os("OCTOFHIR_LOADER_CONFIG").is_some_and(|v| v == path.as_os_str());
    let source = if from_env {
        ConfigSource::EnvironmentVariable
    } else {
        ConfigSource::CliArgument
    };
    (Some(path), source)
}
