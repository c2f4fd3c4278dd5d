//! ClusterClient trait for mocking
//!
//! This trait abstracts the Kubernetes API server as an untyped object store so the
//! reconciler can work with any resource type and unit tests can use the in-memory mock.

use crate::error::ClusterError;
use crate::types::{ResourceType, TypeInfo};
use serde_json::Value;

/// Capabilities the controller needs from the cluster
///
/// Objects are plain JSON documents carrying `apiVersion`, `kind` and `metadata`.
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ClusterClient: Send + Sync {
    /// Look up a resource type; `Ok(None)` when the API server does not serve it
    async fn discover(&self, resource_type: &ResourceType) -> Result<Option<TypeInfo>, ClusterError>;

    /// Get one object; `ClusterError::NotFound` when absent
    async fn get(
        &self,
        resource_type: &ResourceType,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Value, ClusterError>;

    /// List objects of a type, across all namespaces when `namespace` is `None`
    async fn list(
        &self,
        resource_type: &ResourceType,
        namespace: Option<&str>,
    ) -> Result<Vec<Value>, ClusterError>;

    /// Replace an object; `ClusterError::Conflict` on a stale `resourceVersion`
    async fn update(&self, resource_type: &ResourceType, object: &Value) -> Result<Value, ClusterError>;

    /// Replace the whole `status` of an object, guarded by its `resourceVersion`
    async fn update_status(&self, resource_type: &ResourceType, object: &Value) -> Result<Value, ClusterError>;

    /// Server-side apply with forced conflict resolution under `field_manager`
    async fn apply(
        &self,
        resource_type: &ResourceType,
        object: &Value,
        field_manager: &str,
    ) -> Result<Value, ClusterError>;
}
