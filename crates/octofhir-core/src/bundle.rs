//! Bundle document model.
//!
//! A bundle is kept as an untyped [`serde_json::Value`] tree: clinical resources are
//! schema-flexible, so only the few fields the pipeline needs (`entry`, `fullUrl`,
//! `resource.resourceType`, `resource.id`) are read through typed accessors.

use serde_json::Value;

use crate::error::{CoreError, Result};

/// Owning wrapper over a bundle-shaped JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    document: Value,
}

/// Borrowed view of a single bundle entry.
#[derive(Debug, Clone, Copy)]
pub struct Entry<'a> {
    /// Position of the entry inside the `entry` array
    pub index: usize,
    raw: &'a Value,
}

impl Bundle {
    /// Parses one bundle from raw JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Parse`] for malformed JSON or bytes that are not
    /// valid UTF-8, and [`CoreError::NotAnObject`] when the top-level value is
    /// not an object.
    pub fn parse(input: impl AsRef<[u8]>) -> Result<Self> {
        let document: Value = serde_json::from_slice(input.as_ref())?;
        Self::from_value(document)
    }

    /// Wraps an already parsed document.
    pub fn from_value(document: Value) -> Result<Self> {
        if !document.is_object() {
            return Err(CoreError::NotAnObject);
        }
        Ok(Self { document })
    }

    pub fn as_value(&self) -> &Value {
        &self.document
    }

    pub(crate) fn value_mut(&mut self) -> &mut Value {
        &mut self.document
    }

    /// Returns the entries of the bundle.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingEntries`] if `entry` is absent or not an array.
    pub fn entries(&self) -> Result<Vec<Entry<'_>>> {
        let entries = self
            .document
            .get("entry")
            .and_then(Value::as_array)
            .ok_or(CoreError::MissingEntries)?;

        Ok(entries
            .iter()
            .enumerate()
            .map(|(index, raw)| Entry { index, raw })
            .collect())
    }

    /// Consumes the bundle, yielding each entry's `resource` in order.
    ///
    /// Entries without a `resource` object are dropped.
    pub fn into_resources(self) -> Result<Vec<Value>> {
        let Value::Object(mut root) = self.document else {
            return Err(CoreError::NotAnObject);
        };
        let Some(Value::Array(entries)) = root.remove("entry") else {
            return Err(CoreError::MissingEntries);
        };

        Ok(entries
            .into_iter()
            .filter_map(|entry| match entry {
                Value::Object(mut map) => map.remove("resource").filter(Value::is_object),
                _ => None,
            })
            .collect())
    }
}

impl<'a> Entry<'a> {
    pub fn full_url(&self) -> Option<&'a str> {
        self.raw.get("fullUrl").and_then(Value::as_str)
    }

    pub fn resource(&self) -> Option<&'a Value> {
        self.raw.get("resource").filter(|r| r.is_object())
    }

    pub fn resource_type(&self) -> Option<&'a str> {
        self.resource()
            .and_then(|r| r.get("resourceType"))
            .and_then(Value::as_str)
    }

    pub fn id(&self) -> Option<&'a str> {
        self.resource().and_then(|r| r.get("id")).and_then(Value::as_str)
    }
}

/// Reads `resourceType` from a resource tree.
pub fn resource_type_of(resource: &Value) -> Option<&str> {
    resource.get("resourceType").and_then(Value::as_str)
}

/// Reads a non-empty `id` from a resource tree.
pub fn resource_id_of(resource: &Value) -> Option<&str> {
    resource
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_rejects_malformed_json() {
        let err = Bundle::parse("{\"resourceType\": ").unwrap_err();
        assert!(matches!(err, CoreError::Parse(_)));
    }

    #[test]
    fn test_parse_rejects_invalid_utf8() {
        let err = Bundle::parse(b"{\"resourceType\": \"Bundle\", \"x\": \"\xff\xfe\"}").unwrap_err();
        assert!(err.is_parse_error());

        let err = Bundle::parse(b"\xff{}").unwrap_err();
        assert!(err.is_parse_error());
    }

    #[test]
    fn test_parse_rejects_non_object() {
        let err = Bundle::parse("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, CoreError::NotAnObject));
    }

    #[test]
    fn test_entries_missing_collection() {
        let bundle = Bundle::parse(r#"{"resourceType":"Bundle"}"#).unwrap();
        assert!(matches!(bundle.entries(), Err(CoreError::MissingEntries)));
    }

    #[test]
    fn test_entry_accessors() {
        let bundle = Bundle::from_value(json!({
            "resourceType": "Bundle",
            "entry": [
                {"fullUrl": "urn:uuid:1", "resource": {"resourceType": "Patient", "id": "p1"}},
                {"resource": {"resourceType": "Observation"}}
            ]
        }))
        .unwrap();

        let entries = bundle.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].full_url(), Some("urn:uuid:1"));
        assert_eq!(entries[0].resource_type(), Some("Patient"));
        assert_eq!(entries[0].id(), Some("p1"));
        assert_eq!(entries[1].index, 1);
        assert_eq!(entries[1].full_url(), None);
        assert_eq!(entries[1].id(), None);
    }

    #[test]
    fn test_into_resources_preserves_order() {
        let bundle = Bundle::from_value(json!({
            "entry": [
                {"resource": {"resourceType": "Patient", "id": "a"}},
                {"fullUrl": "x"},
                {"resource": {"resourceType": "Encounter", "id": "b"}}
            ]
        }))
        .unwrap();

        let resources = bundle.into_resources().unwrap();
        assert_eq!(resources.len(), 2);
        assert_eq!(resource_type_of(&resources[0]), Some("Patient"));
        assert_eq!(resource_id_of(&resources[1]), Some("b"));
    }

    #[test]
    fn test_resource_id_of_ignores_empty() {
        let resource = json!({"resourceType": "Patient", "id": ""});
        assert_eq!(resource_id_of(&resource), None);
    }
}
