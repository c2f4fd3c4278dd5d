//! Kubernetes cluster client
//!
//! Implements `ClusterClient` on top of `kube::Api<DynamicObject>`, resolving
//! `ApiResource`s through API discovery.

use crate::cluster_trait::ClusterClient;
use crate::error::ClusterError;
use crate::types::{ResourceType, TypeInfo, object_name, object_namespace};
use kube::api::{Api, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::core::{GroupVersionKind, TypeMeta};
use kube::discovery::{self, ApiResource, Scope};
use kube::Client;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// Kubernetes API client for untyped objects
pub struct KubeClusterClient {
    client: Client,
    timeout: Duration,
    /// Positive discovery results; absent types are always re-checked
    resources: Mutex<HashMap<ResourceType, (ApiResource, bool)>>,
}

impl std::fmt::Debug for KubeClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterClient")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl KubeClusterClient {
    /// Create a new cluster client
    ///
    /// # Arguments
    /// * `client` - Kubernetes client
    /// * `timeout` - Deadline applied to every API call
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            resources: Mutex::new(HashMap::new()),
        }
    }

    async fn with_timeout<T, F>(&self, what: &str, fut: F) -> Result<T, ClusterError>
    where
        F: Future<Output = Result<T, kube::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(|e| ClusterError::from_kube(e, what)),
            Err(_elapsed) => Err(ClusterError::Timeout(self.timeout, what.to_string())),
        }
    }

    /// Resolve the `ApiResource` for a type, or `NotFound` when it is not served
    async fn resolve(&self, resource_type: &ResourceType) -> Result<(ApiResource, bool), ClusterError> {
        if let Ok(resources) = self.resources.lock() {
            if let Some(found) = resources.get(resource_type) {
                return Ok(found.clone());
            }
        }

        let gvk = GroupVersionKind::gvk(&resource_type.group, &resource_type.version, &resource_type.kind);
        let what = format!("discovering {}", resource_type);
        let resolved = match tokio::time::timeout(self.timeout, discovery::pinned_kind(&self.client, &gvk)).await {
            Ok(Ok((ar, caps))) => (ar, caps.scope == Scope::Namespaced),
            Ok(Err(kube::Error::Api(response))) if response.code == 404 => {
                return Err(ClusterError::NotFound(format!("resource type {}", resource_type)));
            }
            Ok(Err(kube::Error::Discovery(e))) => {
                debug!("Discovery could not resolve {}: {}", resource_type, e);
                return Err(ClusterError::NotFound(format!("resource type {}", resource_type)));
            }
            Ok(Err(e)) => return Err(ClusterError::Kube(e)),
            Err(_elapsed) => return Err(ClusterError::Timeout(self.timeout, what)),
        };

        if let Ok(mut resources) = self.resources.lock() {
            resources.insert(resource_type.clone(), resolved.clone());
        }
        Ok(resolved)
    }

    fn api(&self, ar: &ApiResource, namespaced: bool, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) if namespaced => Api::namespaced_with(self.client.clone(), ns, ar),
            _ => Api::all_with(self.client.clone(), ar),
        }
    }

    fn to_dynamic(object: &Value) -> Result<(DynamicObject, String), ClusterError> {
        let name = object_name(object)
            .ok_or_else(|| ClusterError::InvalidObject("object has no metadata.name".to_string()))?
            .to_string();
        let dynamic: DynamicObject = serde_json::from_value(object.clone())?;
        Ok((dynamic, name))
    }
}

#[async_trait::async_trait]
impl ClusterClient for KubeClusterClient {
    async fn discover(&self, resource_type: &ResourceType) -> Result<Option<TypeInfo>, ClusterError> {
        match self.resolve(resource_type).await {
            Ok((ar, namespaced)) => Ok(Some(TypeInfo {
                plural: ar.plural,
                namespaced,
            })),
            Err(ClusterError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get(
        &self,
        resource_type: &ResourceType,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Value, ClusterError> {
        let (ar, namespaced) = self.resolve(resource_type).await?;
        let api = self.api(&ar, namespaced, namespace);
        let what = format!("{} {}/{}", resource_type.kind, namespace.unwrap_or_default(), name);
        let object = self.with_timeout(&what, api.get(name)).await?;
        Ok(serde_json::to_value(object)?)
    }

    async fn list(
        &self,
        resource_type: &ResourceType,
        namespace: Option<&str>,
    ) -> Result<Vec<Value>, ClusterError> {
        let (ar, namespaced) = self.resolve(resource_type).await?;
        let api = self.api(&ar, namespaced, namespace);
        let what = format!("listing {}", resource_type);
        let list = self.with_timeout(&what, api.list(&ListParams::default())).await?;

        // List items do not carry TypeMeta
        list.items
            .into_iter()
            .map(|mut item| {
                item.types = Some(TypeMeta {
                    api_version: ar.api_version.clone(),
                    kind: ar.kind.clone(),
                });
                serde_json::to_value(item).map_err(ClusterError::from)
            })
            .collect()
    }

    async fn update(&self, resource_type: &ResourceType, object: &Value) -> Result<Value, ClusterError> {
        let (ar, namespaced) = self.resolve(resource_type).await?;
        let (dynamic, name) = Self::to_dynamic(object)?;
        let api = self.api(&ar, namespaced, object_namespace(object));
        let what = format!("updating {} {}", resource_type.kind, name);
        let updated = self
            .with_timeout(&what, api.replace(&name, &PostParams::default(), &dynamic))
            .await?;
        Ok(serde_json::to_value(updated)?)
    }

    async fn update_status(&self, resource_type: &ResourceType, object: &Value) -> Result<Value, ClusterError> {
        let (ar, namespaced) = self.resolve(resource_type).await?;
        let name = object_name(object)
            .ok_or_else(|| ClusterError::InvalidObject("object has no metadata.name".to_string()))?;
        let api = self.api(&ar, namespaced, object_namespace(object));

        // A PUT replaces the whole status; the resourceVersion guards it
        let body = status_body(object)?;
        let what = format!("updating status of {} {}", resource_type.kind, name);
        let pp = PostParams::default();
        match self
            .with_timeout(&what, api.replace_status(name, &pp, body))
            .await
        {
            Ok(updated) => Ok(serde_json::to_value(updated)?),
            Err(ClusterError::NotFound(_)) => {
                // Types without a status subresource keep status on the main endpoint
                warn!("No status subresource for {}, replacing {} directly", resource_type, name);
                let (dynamic, name) = Self::to_dynamic(object)?;
                let updated = self
                    .with_timeout(&what, api.replace(&name, &pp, &dynamic))
                    .await?;
                Ok(serde_json::to_value(updated)?)
            }
            Err(e) => Err(e),
        }
    }

    async fn apply(
        &self,
        resource_type: &ResourceType,
        object: &Value,
        field_manager: &str,
    ) -> Result<Value, ClusterError> {
        let (ar, namespaced) = self.resolve(resource_type).await?;
        let name = object_name(object)
            .ok_or_else(|| ClusterError::InvalidObject("object has no metadata.name".to_string()))?;
        let api = self.api(&ar, namespaced, object_namespace(object));
        let what = format!("applying {} {}", resource_type.kind, name);
        let applied = self
            .with_timeout(
                &what,
                api.patch(name, &PatchParams::apply(field_manager).force(), &Patch::Apply(object)),
            )
            .await?;
        Ok(serde_json::to_value(applied)?)
    }
}

/// Body of a status replacement: the whole object, with a missing status sent as `{}`
fn status_body(object: &Value) -> Result<Vec<u8>, ClusterError> {
    let mut body = object.clone();
    if body.get("status").is_none_or(Value::is_null) {
        body["status"] = json!({});
    }
    Ok(serde_json::to_vec(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_body_carries_whole_status_and_version() {
        let object = json!({
            "apiVersion": "example.com/v1",
            "kind": "Widget",
            "metadata": {"name": "w", "namespace": "ns1", "resourceVersion": "42"},
            "status": {"services": 1}
        });
        let body: Value = serde_json::from_slice(&status_body(&object).unwrap()).unwrap();
        assert_eq!(body["status"], json!({"services": 1}));
        assert_eq!(body["metadata"]["resourceVersion"], "42");
    }

    #[test]
    fn test_status_body_replaces_null_status_with_empty_map() {
        let object = json!({
            "apiVersion": "example.com/v1",
            "kind": "Widget",
            "metadata": {"name": "w", "resourceVersion": "7"},
            "status": null
        });
        let body: Value = serde_json::from_slice(&status_body(&object).unwrap()).unwrap();
        assert_eq!(body["status"], json!({}));

        let missing = json!({"apiVersion": "v1", "kind": "Service", "metadata": {"name": "s"}});
        let body: Value = serde_json::from_slice(&status_body(&missing).unwrap()).unwrap();
        assert_eq!(body["status"], json!({}));
    }
}
