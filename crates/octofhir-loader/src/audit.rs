//! Durable audit trail of publish attempts.
//!
//! Every non-skipped work item leaves one `{uuid}.json` artifact holding the
//! raw upstream response body. Alongside, `outcomes.ndjson` receives one JSON
//! line per outcome (including duplicate skips) and is never rewritten.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::publisher::PublishOutcome;

pub const OUTCOMES_FILE: &str = "outcomes.ndjson";

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> AuditError + use<> {
    let path = path.to_path_buf();
    move |source| AuditError::Io { path, source }
}

pub struct AuditWriter {
    dir: PathBuf,
    manifest: Mutex<BufWriter<File>>,
}

impl std::fmt::Debug for AuditWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditWriter").field("dir", &self.dir).finish()
    }
}

impl AuditWriter {
    /// Deletes anything left in `dir` by a previous run and starts fresh.
    pub async fn recreate(dir: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let dir = dir.into();
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(&dir)(e)),
        }
        Self::open(dir).await
    }

    /// Opens `dir` for appending, creating it when missing.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(io_err(&dir))?;

        let manifest_path = dir.join(OUTCOMES_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&manifest_path)
            .await
            .map_err(io_err(&manifest_path))?;

        Ok(Self {
            dir,
            manifest: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes one response body under a fresh identifier.
    pub async fn write_artifact(&self, body: &str) -> Result<(Uuid, PathBuf), AuditError> {
        let id = octofhir_core::generate_uuid();
        let path = self.dir.join(format!("{id}.json"));
        fs::write(&path, body.as_bytes())
            .await
            .map_err(io_err(&path))?;
        Ok((id, path))
    }

    /// Appends the outcome as one NDJSON line.
    pub async fn record(&self, outcome: &PublishOutcome) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(outcome)?;
        line.push(b'\n');

        let manifest_path = self.dir.join(OUTCOMES_FILE);
        let mut writer = self.manifest.lock().await;
        writer
            .write_all(&line)
            .await
            .map_err(io_err(&manifest_path))?;
        writer.flush().await.map_err(io_err(&manifest_path))
    }

    /// Number of `{uuid}.json` artifacts currently in the directory.
    pub async fn artifact_count(&self) -> Result<usize, AuditError> {
        count_artifacts(&self.dir).await
    }
}

pub async fn count_artifacts(dir: &Path) -> Result<usize, AuditError> {
    let mut entries = fs::read_dir(dir).await.map_err(io_err(dir))?;
    let mut count = 0;
    while let Some(entry) = entries.next_entry().await.map_err(io_err(dir))? {
        let path = entry.path();
        let is_artifact = path.extension().is_some_and(|ext| ext == "json")
            && path
                .file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|s| Uuid::parse_str(s).is_ok());
        if is_artifact {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::{OutcomeKind, PublishOutcome};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_recreate_clears_previous_run() {
        let root = tempdir().unwrap();
        let dir = root.path().join("responses");
        fs::create_dir_all(&dir).await.unwrap();
        fs::write(dir.join("stale.json"), b"{}").await.unwrap();

        let writer = AuditWriter::recreate(&dir).await.unwrap();
        assert!(!dir.join("stale.json").exists());
        assert!(dir.join(OUTCOMES_FILE).exists());
        assert_eq!(writer.artifact_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_artifact_holds_raw_body() {
        let root = tempdir().unwrap();
        let writer = AuditWriter::recreate(root.path().join("out")).await.unwrap();

        let (id, path) = writer.write_artifact("{\"resourceType\":\"Patient\"}").await.unwrap();
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), format!("{id}.json"));
        assert_eq!(
            fs::read_to_string(&path).await.unwrap(),
            "{\"resourceType\":\"Patient\"}"
        );
        assert_eq!(writer.artifact_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_outcomes_are_appended() {
        let root = tempdir().unwrap();
        let writer = AuditWriter::recreate(root.path()).await.unwrap();

        for status in [201, 400] {
            let outcome = PublishOutcome::new(
                OutcomeKind::from_status(status),
                "Patient",
                None,
                Some(status),
                1,
                None,
            );
            writer.record(&outcome).await.unwrap();
        }

        let text = fs::read_to_string(root.path().join(OUTCOMES_FILE)).await.unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["kind"], "published");
        assert_eq!(lines[1]["kind"], "failed");
        assert_eq!(lines[1]["status"], 400);
    }
}
