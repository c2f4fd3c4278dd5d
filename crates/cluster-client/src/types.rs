//! Resource type identity
//!
//! `ResourceType` is a group/version/kind triple that can be built from the
//! `apiVersion` + `kind` pair found on any Kubernetes object.

use serde_json::Value;
use std::fmt;

/// A Kubernetes resource type (group, version, kind)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceType {
    /// API group; empty for the core group
    pub group: String,
    /// API version
    pub version: String,
    /// Kind
    pub kind: String,
}

impl ResourceType {
    /// Create a resource type from its parts
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// Parse an `apiVersion` ("group/version" or "version") paired with a kind
    pub fn from_api_version(api_version: &str, kind: &str) -> Self {
        match api_version.split_once('/') {
            Some((group, version)) => Self::new(group, version, kind),
            None => Self::new("", api_version, kind),
        }
    }

    /// Read the type of a JSON object from its `apiVersion` and `kind` fields
    pub fn of(object: &Value) -> Option<Self> {
        let api_version = object.get("apiVersion")?.as_str()?;
        let kind = object.get("kind")?.as_str()?;
        if api_version.is_empty() || kind.is_empty() {
            return None;
        }
        Some(Self::from_api_version(api_version, kind))
    }

    /// Core v1 Secret
    pub fn secret() -> Self {
        Self::new("", "v1", "Secret")
    }

    /// Core v1 ConfigMap
    pub fn config_map() -> Self {
        Self::new("", "v1", "ConfigMap")
    }

    /// apiextensions.k8s.io/v1 CustomResourceDefinition
    pub fn custom_resource_definition() -> Self {
        Self::new("apiextensions.k8s.io", "v1", "CustomResourceDefinition")
    }

    /// The `apiVersion` string of this type
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Lower-cased `<kind>.<version>.<group>` key, as exposed to templates
    pub fn key(&self) -> String {
        format!("{}.{}.{}", self.kind, self.version, self.group).to_lowercase()
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.api_version(), self.kind)
    }
}

/// What discovery reports about a served resource type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    /// Plural resource name used in URLs
    pub plural: String,
    /// Whether objects of this type live in a namespace
    pub namespaced: bool,
}

/// `metadata.name` of a JSON object
pub fn object_name(object: &Value) -> Option<&str> {
    object.get("metadata")?.get("name")?.as_str()
}

/// `metadata.namespace` of a JSON object
pub fn object_namespace(object: &Value) -> Option<&str> {
    object
        .get("metadata")?
        .get("namespace")?
        .as_str()
        .filter(|ns| !ns.is_empty())
}
