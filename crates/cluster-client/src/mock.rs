//! Mock ClusterClient for unit testing
//!
//! This module provides an in-memory implementation of `ClusterClient` and a
//! recording `EventPublisher` that can be used in unit tests without a
//! running Kubernetes API server.

use crate::cluster_trait::ClusterClient;
use crate::error::ClusterError;
use crate::events::EventPublisher;
use crate::types::{ResourceType, TypeInfo, object_name, object_namespace};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::EventType;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Storage key: type, namespace ("" for cluster-scoped), name
type ObjectKey = (ResourceType, String, String);

/// Operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    Discover,
    Get,
    List,
    Update,
    UpdateStatus,
    Apply,
}

/// Error returned by an injected failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    NotFound,
    Conflict,
    Timeout,
}

impl MockFailure {
    fn to_error(self, what: String) -> ClusterError {
        match self {
            Self::NotFound => ClusterError::NotFound(what),
            Self::Conflict => ClusterError::Conflict(what),
            Self::Timeout => ClusterError::Timeout(Duration::from_secs(30), what),
        }
    }
}

/// A recorded server-side apply call
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedObject {
    pub resource_type: ResourceType,
    pub object: Value,
    pub field_manager: String,
}

/// Mock ClusterClient for testing
///
/// Types must be registered before objects of that type can be read or
/// written; unregistered types behave like types the API server does not
/// serve. Every write bumps `metadata.resourceVersion`, and writes carrying a
/// stale `resourceVersion` fail with `Conflict`.
#[derive(Clone, Default)]
pub struct MockClusterClient {
    types: Arc<Mutex<HashMap<ResourceType, TypeInfo>>>,
    objects: Arc<Mutex<BTreeMap<ObjectKey, Value>>>,
    failures: Arc<Mutex<HashMap<(MockOperation, ResourceType), MockFailure>>>,
    applied: Arc<Mutex<Vec<AppliedObject>>>,
    updates: Arc<Mutex<Vec<Value>>>,
    status_updates: Arc<Mutex<Vec<Value>>>,
    calls: Arc<Mutex<Vec<(MockOperation, ResourceType)>>>,
    next_version: Arc<Mutex<u64>>,
}

impl MockClusterClient {
    /// Create an empty mock cluster
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve a resource type (for test setup)
    pub fn register_type(&self, resource_type: ResourceType, plural: &str, namespaced: bool) {
        self.types.lock().unwrap().insert(
            resource_type,
            TypeInfo {
                plural: plural.to_string(),
                namespaced,
            },
        );
    }

    /// Stop serving a resource type; its objects stay stored
    pub fn unregister_type(&self, resource_type: &ResourceType) {
        self.types.lock().unwrap().remove(resource_type);
    }

    /// Store an object as-is (for test setup); a `resourceVersion` is assigned if missing
    pub fn insert(&self, mut object: Value) {
        let resource_type = ResourceType::of(&object).expect("object needs apiVersion and kind");
        if object.pointer("/metadata/resourceVersion").is_none() {
            let rv = self.bump_version();
            object["metadata"]["resourceVersion"] = json!(rv);
        }
        let key = Self::key(&resource_type, &object);
        self.objects.lock().unwrap().insert(key, object);
    }

    /// Delete an object (for test setup)
    pub fn remove(&self, resource_type: &ResourceType, namespace: Option<&str>, name: &str) {
        let key = (
            resource_type.clone(),
            namespace.unwrap_or_default().to_string(),
            name.to_string(),
        );
        self.objects.lock().unwrap().remove(&key);
    }

    /// Current stored object
    pub fn object(&self, resource_type: &ResourceType, namespace: Option<&str>, name: &str) -> Option<Value> {
        let key = (
            resource_type.clone(),
            namespace.unwrap_or_default().to_string(),
            name.to_string(),
        );
        self.objects.lock().unwrap().get(&key).cloned()
    }

    /// Make every call of `operation` on `resource_type` fail
    pub fn fail_on(&self, operation: MockOperation, resource_type: ResourceType, failure: MockFailure) {
        self.failures
            .lock()
            .unwrap()
            .insert((operation, resource_type), failure);
    }

    /// Remove all injected failures
    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    /// Apply calls in the order they were made
    pub fn applied(&self) -> Vec<AppliedObject> {
        self.applied.lock().unwrap().clone()
    }

    /// Objects passed to `update`, in order
    pub fn updates(&self) -> Vec<Value> {
        self.updates.lock().unwrap().clone()
    }

    /// Objects passed to `update_status`, in order
    pub fn status_updates(&self) -> Vec<Value> {
        self.status_updates.lock().unwrap().clone()
    }

    /// Number of calls of `operation` on `resource_type`
    pub fn call_count(&self, operation: MockOperation, resource_type: &ResourceType) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(op, ty)| *op == operation && ty == resource_type)
            .count()
    }

    /// Forget recorded calls, applies and updates
    pub fn clear_recorded(&self) {
        self.applied.lock().unwrap().clear();
        self.updates.lock().unwrap().clear();
        self.status_updates.lock().unwrap().clear();
        self.calls.lock().unwrap().clear();
    }

    fn key(resource_type: &ResourceType, object: &Value) -> ObjectKey {
        (
            resource_type.clone(),
            object_namespace(object).unwrap_or_default().to_string(),
            object_name(object).unwrap_or_default().to_string(),
        )
    }

    fn bump_version(&self) -> String {
        let mut version = self.next_version.lock().unwrap();
        *version += 1;
        version.to_string()
    }

    /// Record the call, then apply any injected failure and the type check
    fn enter(&self, operation: MockOperation, resource_type: &ResourceType) -> Result<TypeInfo, ClusterError> {
        self.calls
            .lock()
            .unwrap()
            .push((operation, resource_type.clone()));
        if let Some(failure) = self
            .failures
            .lock()
            .unwrap()
            .get(&(operation, resource_type.clone()))
        {
            return Err(failure.to_error(format!("{:?} {}", operation, resource_type)));
        }
        self.types
            .lock()
            .unwrap()
            .get(resource_type)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(format!("resource type {}", resource_type)))
    }

    /// Check the optimistic-concurrency guard of a write
    fn check_version(stored: &Value, incoming: &Value, what: &str) -> Result<(), ClusterError> {
        match incoming.pointer("/metadata/resourceVersion") {
            Some(rv) if Some(rv) != stored.pointer("/metadata/resourceVersion") => {
                Err(ClusterError::Conflict(what.to_string()))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ClusterClient for MockClusterClient {
    async fn discover(&self, resource_type: &ResourceType) -> Result<Option<TypeInfo>, ClusterError> {
        match self.enter(MockOperation::Discover, resource_type) {
            Ok(info) => Ok(Some(info)),
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
        self.enter(MockOperation::Get, resource_type)?;
        self.object(resource_type, namespace, name).ok_or_else(|| {
            ClusterError::NotFound(format!("{} {}/{}", resource_type.kind, namespace.unwrap_or_default(), name))
        })
    }

    async fn list(
        &self,
        resource_type: &ResourceType,
        namespace: Option<&str>,
    ) -> Result<Vec<Value>, ClusterError> {
        self.enter(MockOperation::List, resource_type)?;
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((ty, ns, _), _)| ty == resource_type && namespace.is_none_or(|wanted| wanted == ns))
            .map(|(_, object)| object.clone())
            .collect())
    }

    async fn update(&self, resource_type: &ResourceType, object: &Value) -> Result<Value, ClusterError> {
        self.enter(MockOperation::Update, resource_type)?;
        let key = Self::key(resource_type, object);
        let what = format!("{} {}", resource_type.kind, key.2);
        let mut objects = self.objects.lock().unwrap();
        let stored = objects
            .get(&key)
            .ok_or_else(|| ClusterError::NotFound(what.clone()))?;
        Self::check_version(stored, object, &what)?;

        let mut updated = object.clone();
        if let Some(status) = stored.get("status") {
            updated["status"] = status.clone();
        }
        updated["metadata"]["resourceVersion"] = json!(self.bump_version());
        objects.insert(key, updated.clone());
        self.updates.lock().unwrap().push(object.clone());
        Ok(updated)
    }

    async fn update_status(&self, resource_type: &ResourceType, object: &Value) -> Result<Value, ClusterError> {
        self.enter(MockOperation::UpdateStatus, resource_type)?;
        let key = Self::key(resource_type, object);
        let what = format!("status of {} {}", resource_type.kind, key.2);
        let mut objects = self.objects.lock().unwrap();
        let stored = objects
            .get(&key)
            .ok_or_else(|| ClusterError::NotFound(what.clone()))?;
        Self::check_version(stored, object, &what)?;

        let mut updated = stored.clone();
        updated["status"] = object.get("status").cloned().unwrap_or(Value::Null);
        updated["metadata"]["resourceVersion"] = json!(self.bump_version());
        objects.insert(key, updated.clone());
        self.status_updates.lock().unwrap().push(object.clone());
        Ok(updated)
    }

    async fn apply(
        &self,
        resource_type: &ResourceType,
        object: &Value,
        field_manager: &str,
    ) -> Result<Value, ClusterError> {
        self.enter(MockOperation::Apply, resource_type)?;
        if object_name(object).is_none() {
            return Err(ClusterError::InvalidObject("object has no metadata.name".to_string()));
        }
        self.applied.lock().unwrap().push(AppliedObject {
            resource_type: resource_type.clone(),
            object: object.clone(),
            field_manager: field_manager.to_string(),
        });

        let key = Self::key(resource_type, object);
        let mut stored = object.clone();
        stored["metadata"]["resourceVersion"] = json!(self.bump_version());
        self.objects.lock().unwrap().insert(key, stored.clone());
        Ok(stored)
    }
}

/// An Event captured by `RecordingEventPublisher`
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub reference: ObjectReference,
    /// "Normal" or "Warning"
    pub type_: String,
    pub reason: String,
    pub action: String,
    pub note: Option<String>,
}

/// EventPublisher that keeps every Event in memory
#[derive(Clone, Default)]
pub struct RecordingEventPublisher {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl RecordingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// All Events in publish order
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Events with the given reason
    pub fn with_reason(&self, reason: &str) -> Vec<RecordedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.reason == reason)
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let type_ = match type_ {
            EventType::Normal => "Normal",
            EventType::Warning => "Warning",
        };
        self.events.lock().unwrap().push(RecordedEvent {
            reference: resource_ref.clone(),
            type_: type_.to_string(),
            reason: reason.to_string(),
            action: action.to_string(),
            note,
        });
    }
}
