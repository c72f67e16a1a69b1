use std::sync::Arc;

use anyhow::Result;
use octofhir_loader::{ImportService, LoaderConfig, Observability};
use tokio::sync::watch;

use crate::output::{print_error, print_success};

/// Runs the import service. With `once`, a single poll decides success:
/// any file left for redelivery fails the command.
pub async fn watch(cfg: LoaderConfig, once: bool) -> Result<bool> {
    let observability = Arc::new(Observability::new(cfg.publisher.verbose));
    let service = ImportService::connect(cfg, observability).await?;

    if once {
        let summary = service.process_once().await?;
        let line = format!(
            "Imported {}, rejected {}, retained {}",
            summary.imported, summary.rejected, summary.retained
        );
        if summary.retained == 0 {
            print_success(&line);
        } else {
            print_error(&line);
        }
        return Ok(summary.retained == 0);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
        }
        let _ = shutdown_tx.send(true);
    });

    service.run(shutdown_rx).await?;
    print_success("Import service stopped");
    Ok(true)
}
