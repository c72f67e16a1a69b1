//! Reference targets used while rewriting bundle-local references.
//!
//! ```
//! use octofhir_core::fhir_reference::{FhirReference, is_bundle_local};
//!
//! assert_eq!(FhirReference::new("Patient", "123").to_relative(), "Patient/123");
//! assert!(is_bundle_local("urn:uuid:abc"));
//! assert!(!is_bundle_local("Patient/123"));
//! ```

/// A persisted resource address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FhirReference {
    pub resource_type: String,
    pub id: String,
}

impl FhirReference {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// `Type/id`, the form written back into resolved references.
    pub fn to_relative(&self) -> String {
        format!("{}/{}", self.resource_type, self.id)
    }
}

/// Whether `reference` addresses an entry of the same bundle (`urn:uuid:`, `urn:oid:`).
pub fn is_bundle_local(reference: &str) -> bool {
    reference.starts_with("urn:")
}
