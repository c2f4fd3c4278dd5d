//! Kubernetes Events for reconciled objects
//!
//! Events are fire-and-forget: a publish failure is logged and never fails a
//! reconcile.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::Client;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use serde_json::Value;
use tracing::warn;

/// Publishes Kubernetes Events on arbitrary objects
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an Event about `resource_ref`
    ///
    /// # Arguments
    /// * `resource_ref` - The object the Event is about
    /// * `type_` - Normal or Warning
    /// * `reason` - Machine-readable reason (see [`reasons`])
    /// * `action` - What the controller was doing (see [`actions`])
    /// * `note` - Human-readable message
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Publisher backed by `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as `controller_name`
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "Failed to publish Kubernetes event");
        }
    }
}

/// Event reasons emitted by the reconciler
pub mod reasons {
    /// Template evaluation or engine selection failed
    pub const FAILED_TEMPLATING: &str = "FailedTemplating";
    /// A dependent object was rejected or its apply failed
    pub const FAILED_APPLYING: &str = "FailedApplying";
    /// A dependent object was applied
    pub const APPLIED: &str = "Applied";
}

/// Event actions emitted by the reconciler
pub mod actions {
    /// Running the definition's templates
    pub const TEMPLATE: &str = "Template";
    /// Applying a dependent object
    pub const APPLY: &str = "Apply";
}

/// Build an `ObjectReference` from the identity fields of a JSON object
pub fn object_reference(object: &Value) -> ObjectReference {
    let field = |pointer: &str| {
        object
            .pointer(pointer)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    ObjectReference {
        api_version: field("/apiVersion"),
        kind: field("/kind"),
        name: field("/metadata/name"),
        namespace: field("/metadata/namespace"),
        uid: field("/metadata/uid"),
        resource_version: field("/metadata/resourceVersion"),
        ..Default::default()
    }
}
