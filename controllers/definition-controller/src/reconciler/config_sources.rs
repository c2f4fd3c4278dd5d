//! Config sources of a definition
//!
//! Each Secret or ConfigMap listed in `spec.config` is read from the
//! definition namespace, adopted by the definition through a (non-controller)
//! owner reference so changes to it fan out to every instance, and merged
//! into the template config. Later sources win on key collision.

use super::Reconciler;
use crate::error::ControllerError;
use crate::reconcile_helpers::{config_map_values, has_owner, merge_config, owner_reference, secret_values, set_owner_reference};
use cluster_client::ResourceType;
use crds::{ConfigSourceRef, ControllerSpec};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

impl Reconciler {
    /// Read, adopt and merge every config source of the definition
    pub(crate) async fn resolve_config(
        &self,
        definition: &Value,
        spec: &ControllerSpec,
    ) -> Result<Map<String, Value>, ControllerError> {
        let mut config = Map::new();
        for source in &spec.config {
            let Some(target) = source.target() else {
                warn!(
                    definition = %self.info.name,
                    "Config source must name exactly one of secretName or configMapName, skipping"
                );
                continue;
            };
            let (resource_type, name) = match target {
                ConfigSourceRef::Secret(name) => (ResourceType::secret(), name),
                ConfigSourceRef::ConfigMap(name) => (ResourceType::config_map(), name),
            };

            let Some(object) = self.adopt_config_source(definition, &resource_type, name).await? else {
                continue;
            };
            let values = match target {
                ConfigSourceRef::Secret(_) => secret_values(&object),
                ConfigSourceRef::ConfigMap(_) => config_map_values(&object),
            };
            debug!(definition = %self.info.name, kind = %resource_type.kind, name, keys = values.len(), "Merging config source");
            merge_config(&mut config, values);
        }
        Ok(config)
    }

    /// Fetch a config source and make sure the definition owns it
    ///
    /// Returns `None` when the source does not exist.
    async fn adopt_config_source(
        &self,
        definition: &Value,
        resource_type: &ResourceType,
        name: &str,
    ) -> Result<Option<Value>, ControllerError> {
        let namespace = self.definition_namespace.as_str();
        let mut object = match self.client.get(resource_type, Some(namespace), name).await {
            Ok(object) => object,
            Err(e) if e.is_not_found() => {
                info!(
                    definition = %self.info.name,
                    kind = %resource_type.kind,
                    namespace,
                    name,
                    "Config source not found, skipping"
                );
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let uid = definition
            .pointer("/metadata/uid")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if !uid.is_empty() && !has_owner(&object, uid) {
            set_owner_reference(&mut object, &owner_reference(definition, false)?)?;
            object = self.client.update(resource_type, &object).await?;
            debug!(definition = %self.info.name, kind = %resource_type.kind, name, "Adopted config source");
        }
        Ok(Some(object))
    }
}
