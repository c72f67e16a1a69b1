//! Bundle-local reference resolution.
//!
//! Entries inside a bundle point at each other through their `fullUrl`
//! (typically `urn:uuid:...`). Before the entries are published individually,
//! every such `reference` is rewritten to the persisted `ResourceType/id` form.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::bundle::Bundle;
use crate::error::{CoreError, Result};
use crate::fhir_reference::{FhirReference, is_bundle_local};

const REFERENCE_KEY: &str = "reference";

/// Mapping from an entry's `fullUrl` to the resource it identifies.
#[derive(Debug, Default, Clone)]
pub struct LookupTable {
    targets: HashMap<String, FhirReference>,
}

impl LookupTable {
    /// Builds the table from every entry of the bundle.
    ///
    /// Each entry must carry a non-empty `fullUrl`, `resource.resourceType` and
    /// `resource.id`. When two entries share a `fullUrl`, the later one wins.
    ///
    /// # Errors
    ///
    /// * [`CoreError::MissingEntries`] if the bundle has no `entry` array
    /// * [`CoreError::UnresolvableEntry`] naming the first entry lacking a required field
    pub fn build(bundle: &Bundle) -> Result<Self> {
        let entries = bundle.entries()?;
        let mut targets = HashMap::with_capacity(entries.len());

        for entry in entries {
            let full_url = non_empty(entry.full_url())
                .ok_or_else(|| CoreError::unresolvable_entry(entry.index, "fullUrl"))?;
            let resource_type = non_empty(entry.resource_type())
                .ok_or_else(|| CoreError::unresolvable_entry(entry.index, "resourceType"))?;
            let id = non_empty(entry.id())
                .ok_or_else(|| CoreError::unresolvable_entry(entry.index, "id"))?;

            targets.insert(full_url.to_string(), FhirReference::new(resource_type, id));
        }

        Ok(Self { targets })
    }

    pub fn get(&self, full_url: &str) -> Option<&FhirReference> {
        self.targets.get(full_url)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Counters collected while rewriting one bundle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionStats {
    /// References replaced with `ResourceType/id`
    pub rewritten: usize,
    /// `urn:` references that matched no entry and were left as-is
    pub unresolved_local: usize,
}

/// Rewrites all bundle-local references in place.
///
/// The rewrite runs on a working copy which replaces the bundle only when the
/// whole walk succeeds, so a rejected bundle is never half-resolved.
///
/// # Errors
///
/// Fails when the lookup table cannot be built or a `null` value is met
/// anywhere inside a resource.
pub fn resolve(bundle: &mut Bundle) -> Result<ResolutionStats> {
    let table = LookupTable::build(bundle)?;
    let mut working = bundle.as_value().clone();
    let mut stats = ResolutionStats::default();

    if let Some(entries) = working.get_mut("entry").and_then(Value::as_array_mut) {
        for (index, entry) in entries.iter_mut().enumerate() {
            if let Some(resource) = entry.get_mut("resource") {
                let path = format!("entry[{index}].resource");
                walk(resource, &table, &path, &mut stats)?;
            }
        }
    }

    *bundle.value_mut() = working;

    debug!(
        rewritten = stats.rewritten,
        unresolved_local = stats.unresolved_local,
        lookup_entries = table.len(),
        "Resolved bundle references"
    );

    Ok(stats)
}

fn walk(node: &mut Value, table: &LookupTable, path: &str, stats: &mut ResolutionStats) -> Result<()> {
    match node {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if key == REFERENCE_KEY {
                    if let Value::String(reference) = child {
                        rewrite_reference(reference, table, stats);
                        continue;
                    }
                }
                walk(child, table, &format!("{path}.{key}"), stats)?;
            }
            Ok(())
        }
        Value::Array(items) => {
            for (i, item) in items.iter_mut().enumerate() {
                walk(item, table, &format!("{path}[{i}]"), stats)?;
            }
            Ok(())
        }
        Value::String(_) | Value::Number(_) | Value::Bool(_) => Ok(()),
        Value::Null => Err(CoreError::unsupported_token("Null", path)),
    }
}

fn rewrite_reference(reference: &mut String, table: &LookupTable, stats: &mut ResolutionStats) {
    match table.get(reference) {
        Some(target) => {
            *reference = target.to_relative();
            stats.rewritten += 1;
        }
        None if is_bundle_local(reference) => stats.unresolved_local += 1,
        None => {}
    }
}
