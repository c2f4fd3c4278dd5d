//! Controller Custom Resource Definition
//!
//! A `Controller` declares how instances of one resource type are reconciled:
//! which type to watch, the template sources that compute dependent objects,
//! which dependent types may be produced, and where configuration comes from.

use crate::references::{DependencyReference, TypeReference};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ControllerSpec defines a template-driven controller
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "declare.microscaler.io",
    version = "v1alpha1",
    kind = "Controller",
    namespaced,
    status = "ControllerStatus",
    printcolumn = r#"{"name":"Kind", "type":"string", "jsonPath":".spec.for.kind"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ControllerSpec {
    /// Template sources keyed by filename; the extension selects the language
    #[serde(default)]
    pub source: BTreeMap<String, String>,

    /// Main resource type whose instances are reconciled
    #[serde(default, rename = "for", skip_serializing_if = "Option::is_none")]
    pub for_type: Option<TypeReference>,

    /// Legacy main type selector: name of the CustomResourceDefinition
    /// (e.g., "widgets.example.com"), used when `for` is not set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crd_name: Option<String>,

    /// Dependent types the templates may produce
    #[serde(default)]
    pub dependencies: Vec<DependencyReference>,

    /// Secrets and ConfigMaps merged into the template config, later entries win
    #[serde(default)]
    pub config: Vec<ConfigSource>,
}

/// Reference to a Secret or ConfigMap in the Controller's namespace
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSource {
    /// Name of a Secret
    #[serde(default, alias = "secret", skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,

    /// Name of a ConfigMap
    #[serde(default, alias = "configMap", skip_serializing_if = "Option::is_none")]
    pub config_map_name: Option<String>,
}

/// Which object a `ConfigSource` points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSourceRef<'a> {
    /// A Secret by name
    Secret(&'a str),
    /// A ConfigMap by name
    ConfigMap(&'a str),
}

impl ConfigSource {
    /// Resolve the referenced object; `None` unless exactly one name is set
    pub fn target(&self) -> Option<ConfigSourceRef<'_>> {
        match (self.secret_name.as_deref(), self.config_map_name.as_deref()) {
            (Some(secret), None) => Some(ConfigSourceRef::Secret(secret)),
            (None, Some(config_map)) => Some(ConfigSourceRef::ConfigMap(config_map)),
            _ => None,
        }
    }
}

/// ControllerStatus is reserved; the controller never writes it
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ControllerStatus {}

impl ControllerSpec {
    /// Whether the dependency list declares the given type
    pub fn declares(&self, api_version: &str, kind: &str) -> bool {
        self.dependencies
            .iter()
            .any(|dep| dep.api_version == api_version && dep.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_deserializes_persisted_shape() {
        let spec: ControllerSpec = serde_json::from_value(serde_json::json!({
            "source": { "main.rhai": "fn reconcile(request) { #{ apply: [] } }" },
            "for": { "apiVersion": "example.com/v1", "kind": "Widget" },
            "dependencies": [
                { "apiVersion": "apps/v1", "kind": "Deployment", "watch": true },
                { "apiVersion": "v1", "kind": "Service" }
            ],
            "config": [ { "secretName": "creds" }, { "configMap": "settings" } ]
        }))
        .unwrap();

        assert_eq!(spec.for_type, Some(TypeReference::new("example.com/v1", "Widget")));
        assert_eq!(spec.dependencies.len(), 2);
        assert!(spec.dependencies[0].watch);
        assert!(!spec.dependencies[1].watch);
        assert_eq!(spec.config[0].target(), Some(ConfigSourceRef::Secret("creds")));
        assert_eq!(spec.config[1].target(), Some(ConfigSourceRef::ConfigMap("settings")));
    }

    #[test]
    fn test_config_source_requires_exactly_one_name() {
        let both = ConfigSource {
            secret_name: Some("a".to_string()),
            config_map_name: Some("b".to_string()),
        };
        assert_eq!(both.target(), None);
        assert_eq!(ConfigSource::default().target(), None);
    }

    #[test]
    fn test_declares_matches_api_version_and_kind() {
        let spec = ControllerSpec {
            dependencies: vec![DependencyReference {
                api_version: "apps/v1".to_string(),
                kind: "Deployment".to_string(),
                watch: false,
            }],
            ..Default::default()
        };
        assert!(spec.declares("apps/v1", "Deployment"));
        assert!(!spec.declares("v1", "Service"));
        assert!(!spec.declares("apps/v1beta1", "Deployment"));
    }
}
