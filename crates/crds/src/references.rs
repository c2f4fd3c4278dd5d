//! Kubernetes type references for Controller definitions
//!
//! Follows the Kubernetes `TypeMeta` convention of an `apiVersion` ("group/version",
//! or just "version" for the core group) paired with a `kind`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to a Kubernetes resource type by `apiVersion` and `kind`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "camelCase")]
pub struct TypeReference {
    /// API version of the type (e.g., "apps/v1", "v1")
    pub api_version: String,

    /// Kind of the type (e.g., "Deployment", "Service")
    pub kind: String,
}

impl TypeReference {
    /// Create a new type reference
    pub fn new(api_version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
        }
    }
}

/// A dependent type a Controller definition is allowed to produce
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "camelCase")]
pub struct DependencyReference {
    /// API version of the dependent type
    pub api_version: String,

    /// Kind of the dependent type
    pub kind: String,

    /// Re-reconcile the owning instance when an object of this type changes
    #[serde(default)]
    pub watch: bool,
}
