//! Object lookups available to templates

use serde_json::Value;

/// Read access to cluster objects from inside a template
///
/// Called synchronously from the evaluating thread.
pub trait ObjectReader: Send + Sync {
    /// Fetch one object; `Ok(None)` when it or its type does not exist
    fn get_object(
        &self,
        api_version: &str,
        kind: &str,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<Value>, String>;
}

/// Reader for which nothing exists
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReader;

impl ObjectReader for NoopReader {
    fn get_object(&self, _: &str, _: &str, _: Option<&str>, _: &str) -> Result<Option<Value>, String> {
        Ok(None)
    }
}

/// Identity of a `get_object` argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ObjectQuery {
    pub api_version: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectQuery {
    /// Parse `{apiVersion, kind, metadata: {name, namespace?}}`
    pub(crate) fn parse(value: &Value, default_namespace: Option<&str>) -> Result<Self, String> {
        let field = |pointer: &str| {
            value
                .pointer(pointer)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Ok(Self {
            api_version: field("/apiVersion").ok_or("get_object: apiVersion is required")?,
            kind: field("/kind").ok_or("get_object: kind is required")?,
            name: field("/metadata/name").ok_or("get_object: metadata.name is required")?,
            namespace: field("/metadata/namespace").or_else(|| default_namespace.map(str::to_string)),
        })
    }

    /// Run the query, mapping "not found" to an empty map
    pub(crate) fn run(&self, reader: &dyn ObjectReader) -> Result<Value, String> {
        let found = reader.get_object(&self.api_version, &self.kind, self.namespace.as_deref(), &self.name)?;
        Ok(found.unwrap_or_else(|| Value::Object(serde_json::Map::new())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_defaults_namespace() {
        let query = ObjectQuery::parse(
            &json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "settings"}}),
            Some("ns1"),
        )
        .unwrap();
        assert_eq!(query.namespace.as_deref(), Some("ns1"));

        let query = ObjectQuery::parse(
            &json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "settings", "namespace": "other"}}),
            Some("ns1"),
        )
        .unwrap();
        assert_eq!(query.namespace.as_deref(), Some("other"));
    }

    #[test]
    fn test_query_requires_identity() {
        let err = ObjectQuery::parse(&json!({"kind": "ConfigMap"}), None).unwrap_err();
        assert!(err.contains("apiVersion"));
    }

    #[test]
    fn test_missing_object_is_empty_map() {
        let query = ObjectQuery::parse(
            &json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "x"}}),
            None,
        )
        .unwrap();
        assert_eq!(query.run(&NoopReader).unwrap(), json!({}));
    }
}
