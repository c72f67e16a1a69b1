use std::sync::Arc;

use anyhow::Result;
use octofhir_loader::{LoaderConfig, Observability, PipelineOrchestrator, RunReport};

use crate::cli::PublishArgs;
use crate::output;

/// Applies command-line overrides on top of the loaded configuration.
pub fn apply_overrides(cfg: &mut LoaderConfig, args: &PublishArgs) {
    if let Some(dir) = &args.input_dir {
        cfg.input.directory = dir.clone();
    }
    if let Some(dir) = &args.output_dir {
        cfg.publisher.output_directory = dir.clone();
    }
    if let Some(server) = &args.server {
        cfg.publisher.fhir_server_url = server.clone();
    }
    if args.verbose {
        cfg.publisher.verbose = true;
    }
}

pub async fn publish(cfg: LoaderConfig, json: bool) -> Result<RunReport> {
    let observability = Arc::new(Observability::new(cfg.publisher.verbose));
    let orchestrator = PipelineOrchestrator::connect(cfg, observability).await?;
    let report = orchestrator.run().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        output::print_run_report(&report);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_overrides_replace_only_given_fields() {
        let mut cfg = LoaderConfig::default();
        let args = PublishArgs {
            input_dir: Some(PathBuf::from("/in")),
            server: Some("https://fhir.example.org".into()),
            ..Default::default()
        };
        apply_overrides(&mut cfg, &args);

        assert_eq!(cfg.input.directory, PathBuf::from("/in"));
        assert_eq!(cfg.publisher.fhir_server_url, "https://fhir.example.org");
        assert_eq!(cfg.publisher.output_directory, PathBuf::from("output"));
        assert!(!cfg.publisher.verbose);
    }
}
