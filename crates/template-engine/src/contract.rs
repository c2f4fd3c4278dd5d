//! Template input and output
//!
//! Templates see the request as plain data:
//!
//! ```text
//! request = {
//!   object:    <the reconciled instance>,
//!   config:    { key: value, ... },
//!   supported: { "deployment.v1.apps": true, ... },
//! }
//! ```
//!
//! and must return `{ apply: [object, ...], status: <any> }`.

use crate::error::TemplateError;
use crate::value::canonicalize;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

/// What a template receives
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateInput {
    /// Snapshot of the reconciled instance
    pub object: Value,
    /// Merged configuration, in declaration order
    pub config: Map<String, Value>,
    /// Dependency types that exist in the cluster, keyed `<kind>.<version>.<group>`
    pub supported: BTreeMap<String, bool>,
}

impl TemplateInput {
    /// The `request` value handed to templates
    pub fn to_request(&self) -> Value {
        canonicalize(json!({
            "object": self.object,
            "config": self.config,
            "supported": self.supported,
        }))
    }

    /// Namespace of the reconciled instance, if any
    pub fn object_namespace(&self) -> Option<&str> {
        self.object
            .pointer("/metadata/namespace")
            .and_then(Value::as_str)
            .filter(|ns| !ns.is_empty())
    }
}

/// What a template returns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateOutput {
    /// Objects to apply, in order
    pub apply: Vec<Value>,
    /// New status of the reconciled instance; `None` when the template returned null
    pub status: Option<Value>,
}

impl TemplateOutput {
    /// Validate and convert the value a template returned
    ///
    /// Any `apply` entry without identity fails the whole output.
    pub fn from_value(value: Value) -> Result<Self, TemplateError> {
        let Value::Object(mut map) = canonicalize(value) else {
            return Err(TemplateError::Conversion("template must return a map".to_string()));
        };

        let apply = match map.remove("apply") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(TemplateError::Conversion(format!(
                    "apply must be a list, got {}",
                    type_name(&other)
                )));
            }
        };
        for (index, entry) in apply.iter().enumerate() {
            check_identity(index, entry)?;
        }

        let status = match map.remove("status") {
            None | Some(Value::Null) => None,
            Some(status) => Some(status),
        };

        Ok(Self { apply, status })
    }
}

fn check_identity(index: usize, entry: &Value) -> Result<(), TemplateError> {
    let present = |pointer: &str| {
        entry
            .pointer(pointer)
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty())
    };
    for (pointer, field) in [("/apiVersion", "apiVersion"), ("/kind", "kind"), ("/metadata/name", "metadata.name")] {
        if !present(pointer) {
            return Err(TemplateError::MissingIdentity { index, field });
        }
    }
    Ok(())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let mut config = Map::new();
        config.insert("b".to_string(), json!("2"));
        config.insert("a".to_string(), json!("1"));
        let input = TemplateInput {
            object: json!({"metadata": {"name": "my-name", "namespace": "ns"}}),
            config,
            supported: BTreeMap::from([("service.v1.".to_string(), true)]),
        };

        let request = input.to_request();
        assert_eq!(request["object"]["metadata"]["name"], "my-name");
        assert_eq!(request["supported"]["service.v1."], true);
        let keys: Vec<_> = request["config"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(input.object_namespace(), Some("ns"));
    }

    #[test]
    fn test_output_without_apply_or_status() {
        let output = TemplateOutput::from_value(json!({"status": null})).unwrap();
        assert!(output.apply.is_empty());
        assert_eq!(output.status, None);
    }

    #[test]
    fn test_one_bad_entry_fails_whole_output() {
        let err = TemplateOutput::from_value(json!({
            "apply": [
                {"apiVersion": "v1", "kind": "Service", "metadata": {"name": "ok"}},
                {"apiVersion": "v1", "kind": "Service", "metadata": {}}
            ]
        }))
        .unwrap_err();
        assert!(matches!(err, TemplateError::MissingIdentity { index: 1, field: "metadata.name" }));
    }

    #[test]
    fn test_non_map_output_rejected() {
        assert!(matches!(
            TemplateOutput::from_value(json!([1, 2])),
            Err(TemplateError::Conversion(_))
        ));
        assert!(matches!(
            TemplateOutput::from_value(json!({"apply": "x"})),
            Err(TemplateError::Conversion(_))
        ));
    }
}
