//! `get_object` for templates, served by the cluster client
//!
//! Templates evaluate on a blocking thread, so lookups drive the async client
//! through the runtime handle captured at construction.

use cluster_client::{ClusterClient, ResourceType};
use serde_json::Value;
use std::sync::Arc;
use template_engine::ObjectReader;
use tokio::runtime::Handle;
use tracing::debug;

/// Reads cluster objects on behalf of a template
pub struct ClusterObjectReader {
    client: Arc<dyn ClusterClient>,
    handle: Handle,
}

impl ClusterObjectReader {
    /// Must be called from within the runtime that will serve lookups
    pub fn new(client: Arc<dyn ClusterClient>, handle: Handle) -> Self {
        Self { client, handle }
    }
}

impl ObjectReader for ClusterObjectReader {
    fn get_object(
        &self,
        api_version: &str,
        kind: &str,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<Value>, String> {
        let resource_type = ResourceType::from_api_version(api_version, kind);
        self.handle.block_on(async {
            let Some(info) = self
                .client
                .discover(&resource_type)
                .await
                .map_err(|e| e.to_string())?
            else {
                debug!(kind, api_version, "get_object on a type the cluster does not serve");
                return Ok(None);
            };

            let namespace = if info.namespaced { namespace } else { None };
            match self.client.get(&resource_type, namespace, name).await {
                Ok(object) => Ok(Some(object)),
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(e.to_string()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_client::MockClusterClient;
    use cluster_client::mock::{MockFailure, MockOperation};
    use serde_json::json;

    fn reader_for(mock: &MockClusterClient) -> Arc<ClusterObjectReader> {
        Arc::new(ClusterObjectReader::new(Arc::new(mock.clone()), Handle::current()))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reads_existing_object() {
        let mock = MockClusterClient::new();
        mock.register_type(ResourceType::config_map(), "configmaps", true);
        mock.insert(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "settings", "namespace": "ns1"},
            "data": {"replicas": "3"}
        }));

        let reader = reader_for(&mock);
        let found = tokio::task::spawn_blocking(move || reader.get_object("v1", "ConfigMap", Some("ns1"), "settings"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.unwrap()["data"]["replicas"], "3");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_object_and_unknown_type_are_none() {
        let mock = MockClusterClient::new();
        mock.register_type(ResourceType::config_map(), "configmaps", true);

        let reader = reader_for(&mock);
        let (missing, unknown) = tokio::task::spawn_blocking(move || {
            (
                reader.get_object("v1", "ConfigMap", Some("ns1"), "absent"),
                reader.get_object("example.com/v1", "Gadget", Some("ns1"), "g"),
            )
        })
        .await
        .unwrap();
        assert_eq!(missing, Ok(None));
        assert_eq!(unknown, Ok(None));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cluster_scoped_ignores_namespace() {
        let mock = MockClusterClient::new();
        let namespace_type = ResourceType::new("", "v1", "Namespace");
        mock.register_type(namespace_type, "namespaces", false);
        mock.insert(json!({"apiVersion": "v1", "kind": "Namespace", "metadata": {"name": "team-a"}}));

        let reader = reader_for(&mock);
        let found = tokio::task::spawn_blocking(move || reader.get_object("v1", "Namespace", Some("ns1"), "team-a"))
            .await
            .unwrap()
            .unwrap();
        assert!(found.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_other_errors_propagate() {
        let mock = MockClusterClient::new();
        mock.register_type(ResourceType::config_map(), "configmaps", true);
        mock.fail_on(MockOperation::Get, ResourceType::config_map(), MockFailure::Timeout);

        let reader = reader_for(&mock);
        let result = tokio::task::spawn_blocking(move || reader.get_object("v1", "ConfigMap", Some("ns1"), "settings"))
            .await
            .unwrap();
        assert!(result.unwrap_err().contains("Timed out"));
    }
}
