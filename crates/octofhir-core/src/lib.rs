//! Core bundle handling for the OctoFHIR loader.
//!
//! This crate holds the parts of the publishing pipeline that work on a single
//! bundle document without any I/O:
//!
//! - [`bundle`] - the untyped bundle tree and entry accessors
//! - [`resolver`] - rewriting bundle-local `urn:` references to `Type/id`
//! - [`validation`] - structural checks run before resolution
//! - [`fhir_reference`] - resolved reference targets

pub mod bundle;
pub mod error;
pub mod fhir_reference;
pub mod id;
pub mod resolver;
pub mod time;
pub mod validation;

pub use bundle::{Bundle, Entry, resource_id_of, resource_type_of};
pub use error::{CoreError, ErrorCategory, Result};
pub use fhir_reference::{FhirReference, is_bundle_local};
pub use id::{generate_id, generate_uuid};
pub use resolver::{LookupTable, ResolutionStats, resolve};
pub use time::{FhirDateTime, now_utc};
pub use validation::{
    DEFAULT_MAX_ENTRIES_PER_BUNDLE, IssueSeverity, ValidationIssue, ValidationReport, Validator,
};
