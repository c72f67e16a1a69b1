use octofhir_core::CoreError;
use octofhir_storage::StorageError;
use thiserror::Error;

/// Failures talking to the upstream FHIR server.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("Token request failed (HTTP {status}): {body}")]
    TokenRequest { status: u16, body: String },

    #[error("Invalid token response: {0}")]
    TokenResponse(String),

    #[error("Failed to serialize request body: {0}")]
    Serialization(#[source] serde_json::Error),
}

impl ClientError {
    pub fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            url: url.into(),
            source,
        }
    }

    /// Connection and timeout failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

/// Classification of a failed publish attempt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("Transient upstream failure (HTTP {status})")]
    Transient { status: u16 },

    #[error("Upstream rejected request (HTTP {status})")]
    Terminal { status: u16 },
}

impl PublishError {
    /// Rate-limited or service-unavailable.
    pub const TRANSIENT_STATUSES: [u16; 2] = [429, 503];

    /// Classifies a non-success status.
    pub fn from_status(status: u16) -> Self {
        if Self::TRANSIENT_STATUSES.contains(&status) {
            Self::Transient { status }
        } else {
            Self::Terminal { status }
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Run-level failures of the loader.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// Aborts the run before any publish attempt.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Audit(#[from] crate::audit::AuditError),

    #[error("Worker pool stopped unexpectedly: {0}")]
    PoolClosed(String),
}

impl LoaderError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, LoaderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(PublishError::from_status(429).is_transient());
        assert!(PublishError::from_status(503).is_transient());
        assert_eq!(
            PublishError::from_status(400),
            PublishError::Terminal { status: 400 }
        );
        assert!(!PublishError::from_status(500).is_transient());
        assert!(!PublishError::from_status(502).is_transient());
    }

    #[test]
    fn test_loader_error_display() {
        let err = LoaderError::configuration("input directory missing");
        assert!(err.is_configuration());
        assert_eq!(err.to_string(), "Configuration error: input directory missing");

        let err = LoaderError::io(
            "/data/in",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.to_string(), "I/O error on /data/in: gone");
    }

    #[test]
    fn test_core_error_is_transparent() {
        let err: LoaderError = CoreError::MissingEntries.into();
        assert_eq!(
            err.to_string(),
            "Unable to find bundle entries for creating lookup table"
        );
    }
}
