//! Reconciliation of the instances of one Controller definition.
//!
//! This module is organized by reconcile phase:
//! - `config_sources`: reading and adopting the definition's Secrets and ConfigMaps
//! - `templating`: selecting, caching and running the definition's engine
//! - `dependents`: validating and applying the objects a template returned

pub mod config_sources;
pub mod dependents;
pub mod templating;

use crate::backoff::ExponentialBackoff;
use crate::bootstrap::{ControllerInfo, definition_type, parse_definition};
use crate::error::ControllerError;
use crate::reconcile_helpers::object_key;
use cluster_client::{ClusterClient, EventPublisher, EventType, actions, object_reference, reasons};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use template_engine::{TemplateInput, TemplateOutput};
use tracing::{debug, info, warn};

/// Backoff state for an instance
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: ExponentialBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new() -> Self {
        Self {
            backoff: ExponentialBackoff::default(),
            error_count: 0,
        }
    }

    fn increment_error(&mut self) {
        self.error_count += 1;
    }
}

/// How a reconcile ended, when it did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The instance no longer exists
    InstanceNotFound,
    /// The definition no longer exists; the restart path handles it
    DefinitionNotFound,
    /// Engine selection or evaluation failed; reported as an Event
    TemplatingFailed,
    /// Dependents were processed and status written
    Reconciled {
        /// Objects applied successfully
        applied: usize,
        /// Objects rejected or failed to apply
        failed: usize,
    },
}

/// Reconciles the instances of one Controller definition.
pub struct Reconciler {
    pub(crate) client: Arc<dyn ClusterClient>,
    pub(crate) events: Arc<dyn EventPublisher>,
    /// Resolved definition this reconciler serves
    pub(crate) info: ControllerInfo,
    pub(crate) definition_namespace: String,
    pub(crate) field_manager: String,
    /// Engine of the last seen definition generation
    engine_cache: Mutex<Option<templating::CachedEngine>>,
    /// Error count tracking per instance (namespace/name -> BackoffState)
    backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl Reconciler {
    /// Creates a reconciler for one resolved definition.
    pub fn new(
        client: Arc<dyn ClusterClient>,
        events: Arc<dyn EventPublisher>,
        info: ControllerInfo,
        definition_namespace: impl Into<String>,
        field_manager_prefix: &str,
    ) -> Self {
        let field_manager = crate::reconcile_helpers::field_manager(field_manager_prefix, &info.name);
        Self {
            client,
            events,
            info,
            definition_namespace: definition_namespace.into(),
            field_manager,
            engine_cache: Mutex::new(None),
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Name of the definition this reconciler serves
    pub fn definition_name(&self) -> &str {
        &self.info.name
    }

    pub fn info(&self) -> &ControllerInfo {
        &self.info
    }

    /// Reconcile one instance of the main type
    pub async fn reconcile(&self, namespace: Option<&str>, name: &str) -> Result<ReconcileOutcome, ControllerError> {
        let definition_name = self.info.name.as_str();
        debug!(definition = definition_name, namespace, name, "Reconciling instance");

        let instance = match self.client.get(&self.info.main_type, namespace, name).await {
            Ok(instance) => instance,
            Err(e) if e.is_not_found() => {
                debug!(definition = definition_name, namespace, name, "Instance not found, assuming deleted");
                return Ok(ReconcileOutcome::InstanceNotFound);
            }
            Err(e) => return Err(e.into()),
        };

        let definition_value = match self
            .client
            .get(&definition_type(), Some(self.definition_namespace.as_str()), definition_name)
            .await
        {
            Ok(value) => value,
            Err(e) if e.is_not_found() => {
                debug!(definition = definition_name, "Definition not found, waiting for restart");
                return Ok(ReconcileOutcome::DefinitionNotFound);
            }
            Err(e) => return Err(e.into()),
        };
        let definition = parse_definition(definition_value.clone())?;

        let config = self.resolve_config(&definition_value, &definition.spec).await?;

        let input = TemplateInput {
            object: instance.clone(),
            config,
            supported: self.info.supported(),
        };
        let output = match self.run_templates(&definition, &input).await {
            Ok(output) => output,
            Err(e) => {
                warn!(definition = definition_name, namespace, name, "Templating failed: {}", e);
                self.events
                    .publish(
                        &object_reference(&instance),
                        EventType::Warning,
                        reasons::FAILED_TEMPLATING,
                        actions::TEMPLATE,
                        Some(e.to_string()),
                    )
                    .await;
                return Ok(ReconcileOutcome::TemplatingFailed);
            }
        };

        let TemplateOutput { apply, status } = output;
        let (applied, failed) = self
            .apply_dependents(&definition.spec, &instance, apply)
            .await;

        match self.write_status(&instance, status).await {
            Ok(()) => {}
            Err(ControllerError::Cluster(e)) if e.is_not_found() => {
                debug!(definition = definition_name, namespace, name, "Instance deleted before status write");
                return Ok(ReconcileOutcome::InstanceNotFound);
            }
            Err(e) => return Err(e),
        }

        info!(definition = definition_name, namespace, name, applied, failed, "Reconciled instance");
        Ok(ReconcileOutcome::Reconciled { applied, failed })
    }

    /// Replace the instance status, guarded by the fetched resourceVersion
    async fn write_status(&self, instance: &Value, status: Option<Value>) -> Result<(), ControllerError> {
        let mut updated = instance.clone();
        updated["status"] = status.unwrap_or_else(|| json!({}));
        self.client
            .update_status(&self.info.main_type, &updated)
            .await?;
        Ok(())
    }

    /// Delay before retrying a failed instance; grows with each failure
    pub fn next_backoff(&self, namespace: Option<&str>, name: &str) -> Duration {
        let key = object_key(namespace, name);
        let mut states = match self.backoff_states.lock() {
            Ok(states) => states,
            Err(poisoned) => poisoned.into_inner(),
        };
        let state = states.entry(key).or_insert_with(BackoffState::new);
        state.increment_error();
        state.backoff.next_backoff()
    }

    /// Forget the failures of an instance after a successful reconcile
    pub fn reset_backoff(&self, namespace: Option<&str>, name: &str) {
        let key = object_key(namespace, name);
        let mut states = match self.backoff_states.lock() {
            Ok(states) => states,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(state) = states.remove(&key) {
            debug!(key = %key, errors = state.error_count, "Reset backoff after successful reconcile");
        }
    }
}
