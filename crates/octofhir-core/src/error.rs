use thiserror::Error;

/// Core error types for bundle handling
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Bundle is not a JSON object")]
    NotAnObject,

    #[error("Unable to find bundle entries for creating lookup table")]
    MissingEntries,

    #[error("Entry {index} is missing required field '{field}'")]
    UnresolvableEntry { index: usize, field: &'static str },

    #[error("Invalid token type {token} encountered at {path}")]
    UnsupportedToken { token: &'static str, path: String },

    #[error("Invalid resource data: {message}")]
    InvalidResource { message: String },
}

impl CoreError {
    /// Create a new UnresolvableEntry error
    pub fn unresolvable_entry(index: usize, field: &'static str) -> Self {
        Self::UnresolvableEntry { index, field }
    }

    /// Create a new UnsupportedToken error
    pub fn unsupported_token(token: &'static str, path: impl Into<String>) -> Self {
        Self::UnsupportedToken {
            token,
            path: path.into(),
        }
    }

    /// Create a new InvalidResource error
    pub fn invalid_resource(message: impl Into<String>) -> Self {
        Self::InvalidResource {
            message: message.into(),
        }
    }

    /// Malformed input that never reached resolution
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Self::Parse(_) | Self::NotAnObject)
    }

    /// Get error category for logging/monitoring
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Parse(_) | Self::NotAnObject => ErrorCategory::Parse,
            Self::MissingEntries | Self::UnresolvableEntry { .. } | Self::UnsupportedToken { .. } => {
                ErrorCategory::Resolution
            }
            Self::InvalidResource { .. } => ErrorCategory::Validation,
        }
    }
}

/// Error categories for monitoring and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Parse,
    Resolution,
    Validation,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse => write!(f, "parse"),
            Self::Resolution => write!(f, "resolution"),
            Self::Validation => write!(f, "validation"),
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
