//! Helper functions for common reconciliation patterns
//!
//! Pure transformations on JSON objects used by the reconciler: owner
//! references, namespace defaulting and reading config sources.

use crate::error::ControllerError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use cluster_client::object_namespace;
use crds::{OWNERSHIP_ANNOTATION, OWNERSHIP_NON_CONTROLLER, OWNERSHIP_NONE};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use serde_json::{Map, Value, json};
use tracing::warn;

/// How a dependent object is linked to the instance that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// No owner reference
    None,
    /// Owner reference without the controller flag
    NonController,
    /// Owner reference with `controller` and `blockOwnerDeletion` set
    Controller,
}

impl Ownership {
    /// Read the ownership annotation; unknown values mean `Controller`
    pub fn of(object: &Value) -> Self {
        let annotation = object
            .pointer("/metadata/annotations")
            .and_then(|annotations| annotations.get(OWNERSHIP_ANNOTATION))
            .and_then(Value::as_str);
        match annotation {
            Some(OWNERSHIP_NONE) => Self::None,
            Some(OWNERSHIP_NON_CONTROLLER) => Self::NonController,
            _ => Self::Controller,
        }
    }
}

/// Owner reference pointing at `owner`
///
/// Fails when the owner lacks any of apiVersion, kind, name or uid.
pub fn owner_reference(owner: &Value, controller: bool) -> Result<OwnerReference, ControllerError> {
    let field = |pointer: &str| {
        owner
            .pointer(pointer)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                ControllerError::InvalidDefinition(
                    owner
                        .pointer("/metadata/name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    format!("owner has no {}", pointer.trim_start_matches('/').replace('/', ".")),
                )
            })
    };

    Ok(OwnerReference {
        api_version: field("/apiVersion")?,
        kind: field("/kind")?,
        name: field("/metadata/name")?,
        uid: field("/metadata/uid")?,
        controller: controller.then_some(true),
        block_owner_deletion: controller.then_some(true),
    })
}

/// Whether `object` carries an owner reference with `uid`
pub fn has_owner(object: &Value, uid: &str) -> bool {
    object
        .pointer("/metadata/ownerReferences")
        .and_then(Value::as_array)
        .is_some_and(|refs| refs.iter().any(|r| r.get("uid").and_then(Value::as_str) == Some(uid)))
}

/// Add `reference` to the owner references of `object`
///
/// An existing reference with the same uid is replaced. Returns whether the
/// object changed.
pub fn set_owner_reference(object: &mut Value, reference: &OwnerReference) -> Result<bool, ControllerError> {
    let reference = serde_json::to_value(reference)?;
    let metadata = ensure_map(object, "metadata")?;
    let refs = metadata
        .entry("ownerReferences")
        .or_insert_with(|| Value::Array(Vec::new()));
    let Value::Array(refs) = refs else {
        return Err(ControllerError::InvalidDefinition(
            String::new(),
            "metadata.ownerReferences is not a list".to_string(),
        ));
    };

    match refs.iter_mut().find(|r| r.get("uid") == reference.get("uid")) {
        Some(existing) if *existing == reference => Ok(false),
        Some(existing) => {
            *existing = reference;
            Ok(true)
        }
        None => {
            refs.push(reference);
            Ok(true)
        }
    }
}

/// Link a dependent object to `owner` according to its ownership annotation
pub fn apply_ownership(object: &mut Value, owner: &Value) -> Result<Ownership, ControllerError> {
    let ownership = Ownership::of(object);
    match ownership {
        Ownership::None => {}
        Ownership::NonController => {
            set_owner_reference(object, &owner_reference(owner, false)?)?;
        }
        Ownership::Controller => {
            set_owner_reference(object, &owner_reference(owner, true)?)?;
        }
    }
    Ok(ownership)
}

/// Refuse owner references the garbage collector would treat as dangling
///
/// A namespaced owner may only own namespaced objects in its own namespace.
/// Cluster-scoped owners may own anything.
pub fn check_owner_scope(
    object: &Value,
    object_namespaced: bool,
    owner: &Value,
    owner_namespaced: bool,
) -> Result<(), ControllerError> {
    if !owner_namespaced {
        return Ok(());
    }
    let owner_namespace = object_namespace(owner).unwrap_or_default();
    if !object_namespaced {
        return Err(ControllerError::Rejected(format!(
            "cluster-scoped object cannot be owned by an instance in namespace {}",
            owner_namespace
        )));
    }
    match object_namespace(object) {
        Some(namespace) if namespace == owner_namespace => Ok(()),
        namespace => Err(ControllerError::Rejected(format!(
            "object in namespace {} cannot be owned by an instance in namespace {}",
            namespace.unwrap_or_default(),
            owner_namespace
        ))),
    }
}

/// Set `metadata.namespace` on a namespaced object that has none
///
/// Objects produced for a cluster-scoped instance fall back to the
/// definition namespace.
pub fn default_namespace(object: &mut Value, namespaced: bool, instance_namespace: Option<&str>, definition_namespace: &str) {
    if !namespaced || object_namespace(object).is_some() {
        return;
    }
    let namespace = instance_namespace.unwrap_or(definition_namespace);
    if let Ok(metadata) = ensure_map(object, "metadata") {
        metadata.insert("namespace".to_string(), json!(namespace));
    }
}

/// Key/value pairs of a ConfigMap (`data`, then `binaryData`)
pub fn config_map_values(config_map: &Value) -> Vec<(String, Value)> {
    let mut values = string_values(config_map.get("data"));
    values.extend(decoded_values(config_map, "binaryData"));
    values
}

/// Key/value pairs of a Secret, base64-decoded
pub fn secret_values(secret: &Value) -> Vec<(String, Value)> {
    decoded_values(secret, "data")
}

/// Merge `values` into `config`; later values win
pub fn merge_config(config: &mut Map<String, Value>, values: Vec<(String, Value)>) {
    for (key, value) in values {
        config.insert(key, value);
    }
}

/// Server-side-apply field manager of a definition
pub fn field_manager(prefix: &str, definition: &str) -> String {
    format!("{}-{}", prefix, definition)
}

/// `namespace/name` key of an object, or `name` when cluster-scoped
pub fn object_key(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) => format!("{}/{}", ns, name),
        None => name.to_string(),
    }
}

fn string_values(data: Option<&Value>) -> Vec<(String, Value)> {
    data.and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter(|(_, v)| v.is_string())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default()
}

fn decoded_values(object: &Value, field: &str) -> Vec<(String, Value)> {
    let name = object
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let Some(data) = object.get(field).and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut values = Vec::with_capacity(data.len());
    for (key, encoded) in data {
        let Some(encoded) = encoded.as_str() else {
            continue;
        };
        let decoded = match BASE64.decode(encoded) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(source = name, key = %key, "Skipping config value that is not valid base64: {}", e);
                continue;
            }
        };
        match String::from_utf8(decoded) {
            Ok(text) => values.push((key.clone(), Value::String(text))),
            Err(_) => warn!(source = name, key = %key, "Skipping config value that is not valid UTF-8"),
        }
    }
    values
}

fn ensure_map<'a>(object: &'a mut Value, field: &str) -> Result<&'a mut Map<String, Value>, ControllerError> {
    let Value::Object(map) = object else {
        return Err(ControllerError::InvalidDefinition(
            String::new(),
            "object is not a map".to_string(),
        ));
    };
    let entry = map
        .entry(field.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    match entry {
        Value::Object(inner) => Ok(inner),
        _ => Err(ControllerError::InvalidDefinition(
            String::new(),
            format!("{} is not a map", field),
        )),
    }
}

#[cfg(test)]
#[path = "reconcile_helpers_test.rs"]
mod reconcile_helpers_test;
