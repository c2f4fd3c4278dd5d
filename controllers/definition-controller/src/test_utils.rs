//! Test utilities for unit testing reconcilers
//!
//! This module provides helpers for creating test data and setting up test scenarios.

use crate::bootstrap::{ControllerInfo, definition_type, parse_definition, resolve_definition};
use crate::reconciler::Reconciler;
use cluster_client::{MockClusterClient, RecordingEventPublisher, ResourceType};
use serde_json::{Value, json};
use std::sync::Arc;

/// Namespace holding definitions in tests
pub const DEFINITION_NAMESPACE: &str = "declare-system";

/// Namespace of test instances
pub const INSTANCE_NAMESPACE: &str = "ns1";

pub fn widget_type() -> ResourceType {
    ResourceType::new("example.com", "v1", "Widget")
}

pub fn service_type() -> ResourceType {
    ResourceType::new("", "v1", "Service")
}

pub fn deployment_type() -> ResourceType {
    ResourceType::new("apps", "v1", "Deployment")
}

/// Mock cluster serving definitions, config sources, CRDs, Widgets and Services
pub fn create_test_cluster() -> MockClusterClient {
    let mock = MockClusterClient::new();
    mock.register_type(definition_type(), "controllers", true);
    mock.register_type(ResourceType::secret(), "secrets", true);
    mock.register_type(ResourceType::config_map(), "configmaps", true);
    mock.register_type(ResourceType::custom_resource_definition(), "customresourcedefinitions", false);
    mock.register_type(widget_type(), "widgets", true);
    mock.register_type(service_type(), "services", true);
    mock
}

/// Helper to create a Controller definition for Widgets
///
/// `dependencies` are `(apiVersion, kind, watch)` triples.
pub fn create_test_definition(
    name: &str,
    sources: &[(&str, &str)],
    dependencies: &[(&str, &str, bool)],
    config: Value,
) -> Value {
    let source: serde_json::Map<String, Value> = sources
        .iter()
        .map(|(file, text)| (file.to_string(), json!(text)))
        .collect();
    let dependencies: Vec<Value> = dependencies
        .iter()
        .map(|(api_version, kind, watch)| json!({"apiVersion": api_version, "kind": kind, "watch": watch}))
        .collect();
    json!({
        "apiVersion": "declare.microscaler.io/v1alpha1",
        "kind": "Controller",
        "metadata": {
            "name": name,
            "namespace": DEFINITION_NAMESPACE,
            "uid": format!("uid-{}", name),
            "generation": 1
        },
        "spec": {
            "source": source,
            "for": {"apiVersion": "example.com/v1", "kind": "Widget"},
            "dependencies": dependencies,
            "config": config
        }
    })
}

/// Helper to create a Widget instance
pub fn create_test_widget(name: &str, spec: Value) -> Value {
    json!({
        "apiVersion": "example.com/v1",
        "kind": "Widget",
        "metadata": {
            "name": name,
            "namespace": INSTANCE_NAMESPACE,
            "uid": format!("uid-{}", name)
        },
        "spec": spec
    })
}

/// Resolve a stored definition the way bootstrap does
pub async fn resolve_test_info(mock: &MockClusterClient, definition: &Value) -> ControllerInfo {
    let definition = parse_definition(definition.clone()).unwrap();
    resolve_definition(mock, &definition)
        .await
        .unwrap()
        .expect("main type should exist")
}

/// Store `definition` and build a reconciler for it
pub async fn create_test_reconciler(
    mock: &MockClusterClient,
    events: &RecordingEventPublisher,
    definition: Value,
) -> Reconciler {
    mock.insert(definition.clone());
    let info = resolve_test_info(mock, &definition).await;
    Reconciler::new(
        Arc::new(mock.clone()),
        Arc::new(events.clone()),
        info,
        DEFINITION_NAMESPACE,
        "declare",
    )
}
