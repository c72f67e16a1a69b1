//! Storage error types for deduplication backends.

use std::fmt;

/// Errors that can occur while reading or writing dedup records.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path of the file being accessed.
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The persisted snapshot could not be encoded or decoded.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the encoding failure.
        message: String,
    },

    /// The configured backend is not known.
    #[error("Unsupported dedup backend: {backend}")]
    UnsupportedBackend {
        /// The backend name from configuration.
        backend: String,
    },
}

impl StorageError {
    /// Creates a new `Io` error.
    #[must_use]
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a new `Serialization` error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedBackend` error.
    #[must_use]
    pub fn unsupported_backend(backend: impl Into<String>) -> Self {
        Self::UnsupportedBackend {
            backend: backend.into(),
        }
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Io { .. } => ErrorCategory::Infrastructure,
            Self::Serialization { .. } => ErrorCategory::Serialization,
            Self::UnsupportedBackend { .. } => ErrorCategory::Configuration,
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

/// Categories of storage errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Filesystem or connection failure.
    Infrastructure,
    /// Snapshot encoding failure.
    Serialization,
    /// Misconfigured backend.
    Configuration,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Serialization => write!(f, "serialization"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}
