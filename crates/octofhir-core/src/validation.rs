//! Structural bundle checks.
//!
//! Only the shape the publishing pipeline depends on is verified here. Profile
//! and terminology conformance belong to the upstream server.

use serde::Serialize;
use serde_json::Value;

/// Default soft limit on entries per bundle.
pub const DEFAULT_MAX_ENTRIES_PER_BUNDLE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    pub message: String,
}

impl ValidationIssue {
    fn error(message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Error,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Warning,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.severity {
            IssueSeverity::Error => write!(f, "error: {}", self.message),
            IssueSeverity::Warning => write!(f, "warning: {}", self.message),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Warning)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Validator {
    max_entries_per_bundle: usize,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES_PER_BUNDLE)
    }
}

impl Validator {
    pub fn new(max_entries_per_bundle: usize) -> Self {
        Self {
            max_entries_per_bundle,
        }
    }

    /// Checks the bundle structure.
    ///
    /// Exceeding the entry soft limit produces a warning but keeps `ok` true.
    pub fn validate(&self, document: &Value) -> ValidationReport {
        let mut issues = Vec::new();

        let Some(root) = document.as_object() else {
            issues.push(ValidationIssue::error("bundle must be a JSON object"));
            return ValidationReport { ok: false, issues };
        };

        if let Some(resource_type) = root.get("resourceType") {
            if resource_type.as_str() != Some("Bundle") {
                issues.push(ValidationIssue::error(format!(
                    "resourceType must be 'Bundle', found {resource_type}"
                )));
            }
        }

        match root.get("entry") {
            None => issues.push(ValidationIssue::error("bundle has no 'entry' collection")),
            Some(Value::Array(entries)) => {
                for (index, entry) in entries.iter().enumerate() {
                    match entry.as_object() {
                        None => issues.push(ValidationIssue::error(format!(
                            "entry[{index}] is not an object"
                        ))),
                        Some(obj) if !obj.get("resource").is_some_and(Value::is_object) => {
                            issues.push(ValidationIssue::error(format!(
                                "entry[{index}] has no 'resource' object"
                            )));
                        }
                        Some(_) => {}
                    }
                }

                if entries.len() > self.max_entries_per_bundle {
                    issues.push(ValidationIssue::warning(format!(
                        "bundle has {} entries, exceeding the limit of {}",
                        entries.len(),
                        self.max_entries_per_bundle
                    )));
                }
            }
            Some(_) => issues.push(ValidationIssue::error("'entry' must be an array")),
        }

        let ok = !issues.iter().any(|i| i.severity == IssueSeverity::Error);
        ValidationReport { ok, issues }
    }
}
