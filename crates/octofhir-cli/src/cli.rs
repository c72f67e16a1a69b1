use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "octofhir-loader")]
#[command(about = "OctoFHIR loader: publish FHIR bundles to a FHIR server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to octofhir-loader.toml when present)
    #[arg(short, long, global = true, env = "OCTOFHIR_LOADER_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Publish every bundle line of the NDJSON files in the input directory
    Publish(PublishArgs),
    /// Poll the import directory and publish bundle files until Ctrl-C
    Watch(WatchArgs),
    /// Print the effective configuration
    Config,
}

#[derive(clap::Args, Default)]
pub struct PublishArgs {
    /// Input directory (overrides input.directory)
    #[arg(long)]
    pub input_dir: Option<PathBuf>,
    /// Audit output directory (overrides publisher.output_directory)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
    /// Upstream FHIR base URL (overrides publisher.fhir_server_url)
    #[arg(short, long)]
    pub server: Option<String>,
    /// Log upstream error bodies
    #[arg(short, long)]
    pub verbose: bool,
    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args, Default)]
pub struct WatchArgs {
    /// Process the files waiting now, then exit
    #[arg(long)]
    pub once: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_overrides_parse() {
        let cli = Cli::try_parse_from([
            "octofhir-loader",
            "publish",
            "--input-dir",
            "/data/in",
            "--server",
            "https://fhir.example.org",
            "--config",
            "loader.toml",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("loader.toml")));
        let Commands::Publish(args) = cli.command else {
            panic!("expected publish");
        };
        assert_eq!(args.input_dir, Some(PathBuf::from("/data/in")));
        assert_eq!(args.server.as_deref(), Some("https://fhir.example.org"));
        assert!(args.output_dir.is_none());
        assert!(!args.verbose);
    }

    #[test]
    fn test_watch_arguments() {
        let cli = Cli::try_parse_from(["octofhir-loader", "watch"]).unwrap();
        assert!(matches!(cli.command, Commands::Watch(WatchArgs { once: false })));

        let cli = Cli::try_parse_from(["octofhir-loader", "watch", "--once"]).unwrap();
        assert!(matches!(cli.command, Commands::Watch(WatchArgs { once: true })));

        assert!(Cli::try_parse_from(["octofhir-loader", "watch", "--server", "x"]).is_err());
    }
}
