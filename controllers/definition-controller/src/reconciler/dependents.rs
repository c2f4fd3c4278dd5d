//! Applying template output
//!
//! Objects are processed strictly in output order. A rejected or failed
//! object is reported as an Event on the instance and never stops the
//! objects after it.

use super::Reconciler;
use crate::error::ControllerError;
use crate::reconcile_helpers::{Ownership, apply_ownership, check_owner_scope, default_namespace};
use cluster_client::{EventType, ResourceType, actions, object_name, object_namespace, object_reference, reasons};
use crds::ControllerSpec;
use serde_json::Value;
use tracing::{debug, warn};

impl Reconciler {
    /// Apply each object; returns (applied, failed) counts
    pub(crate) async fn apply_dependents(
        &self,
        spec: &ControllerSpec,
        instance: &Value,
        objects: Vec<Value>,
    ) -> (usize, usize) {
        let instance_ref = object_reference(instance);
        let mut applied = 0;
        let mut failed = 0;

        for object in objects {
            let description = describe(&object);
            match self.apply_dependent(spec, instance, object).await {
                Ok(()) => {
                    applied += 1;
                    self.events
                        .publish(
                            &instance_ref,
                            EventType::Normal,
                            reasons::APPLIED,
                            actions::APPLY,
                            Some(format!("Applied {}", description)),
                        )
                        .await;
                }
                Err(e) => {
                    failed += 1;
                    warn!(definition = %self.info.name, object = %description, "Failed to apply: {}", e);
                    self.events
                        .publish(
                            &instance_ref,
                            EventType::Warning,
                            reasons::FAILED_APPLYING,
                            actions::APPLY,
                            Some(format!("{}: {}", description, e)),
                        )
                        .await;
                }
            }
        }
        (applied, failed)
    }

    async fn apply_dependent(
        &self,
        spec: &ControllerSpec,
        instance: &Value,
        mut object: Value,
    ) -> Result<(), ControllerError> {
        let resource_type = ResourceType::of(&object).ok_or_else(|| {
            ControllerError::Rejected("object has no apiVersion or kind".to_string())
        })?;

        if !spec.declares(&resource_type.api_version(), &resource_type.kind) {
            return Err(ControllerError::Rejected(format!(
                "{} is not a declared dependency",
                resource_type
            )));
        }
        let Some(type_info) = self.info.supported_type(&resource_type) else {
            return Err(ControllerError::Rejected(format!(
                "{} does not exist in the cluster",
                resource_type
            )));
        };

        default_namespace(
            &mut object,
            type_info.namespaced,
            object_namespace(instance),
            &self.definition_namespace,
        );
        if Ownership::of(&object) != Ownership::None {
            check_owner_scope(&object, type_info.namespaced, instance, self.info.main.namespaced)?;
        }
        let ownership = apply_ownership(&mut object, instance)?;

        self.client
            .apply(&resource_type, &object, &self.field_manager)
            .await?;
        debug!(
            definition = %self.info.name,
            kind = %resource_type.kind,
            namespace = object_namespace(&object),
            name = object_name(&object),
            ?ownership,
            "Applied dependent object"
        );
        Ok(())
    }
}

/// `Kind namespace/name` of an object, for Events and logs
fn describe(object: &Value) -> String {
    let kind = object.get("kind").and_then(Value::as_str).unwrap_or_default();
    let name = object_name(object).unwrap_or_default();
    match object_namespace(object) {
        Some(ns) => format!("{} {}/{}", kind, ns, name),
        None => format!("{} {}", kind, name),
    }
}
