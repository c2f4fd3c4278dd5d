//! Kubernetes resource watchers.
//!
//! Each registered definition gets one `kube_runtime::Controller` over its
//! main type. Besides the instances themselves it watches:
//! - the definition, fanning out to every instance
//! - Secrets and ConfigMaps owned by the definition, with the same fan-out
//! - every watched and supported dependency type, mapped back to instances
//!   through owner references (controller or not)

use crate::config::Config;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::restart::RestartSignal;
use cluster_client::{ResourceType, TypeInfo};
use futures::StreamExt;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{ApiResource, DynamicObject};
use kube::{Api, Client, Resource, ResourceExt};
use kube_runtime::controller::{Action, Config as ControllerConfig};
use kube_runtime::reflector::{ObjectRef, Store};
use kube_runtime::{Controller, watcher};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// `ApiResource` of a discovered type
pub fn api_resource(resource_type: &ResourceType, info: &TypeInfo) -> ApiResource {
    ApiResource {
        group: resource_type.group.clone(),
        version: resource_type.version.clone(),
        api_version: resource_type.api_version(),
        kind: resource_type.kind.clone(),
        plural: info.plural.clone(),
    }
}

/// Instances named by owner references that point at the main type
pub fn owner_refs_to_instances(
    owners: &[OwnerReference],
    namespace: Option<&str>,
    main: &ApiResource,
    namespaced: bool,
) -> Vec<ObjectRef<DynamicObject>> {
    owners
        .iter()
        .filter(|owner| owner.api_version == main.api_version && owner.kind == main.kind)
        .map(|owner| {
            let instance = ObjectRef::new_with(&owner.name, main.clone());
            match namespace {
                Some(ns) if namespaced => instance.within(ns),
                _ => instance,
            }
        })
        .collect()
}

/// Whether owner references include the named Controller definition
pub fn owned_by_definition(owners: &[OwnerReference], definition: &str) -> bool {
    let api_version = crds::Controller::api_version(&());
    let kind = crds::Controller::kind(&());
    owners
        .iter()
        .any(|owner| owner.api_version == api_version && owner.kind == kind && owner.name == definition)
}

/// Every instance currently known to the control loop
fn all_instances(store: &Store<DynamicObject>, main: &ApiResource) -> Vec<ObjectRef<DynamicObject>> {
    store
        .state()
        .iter()
        .map(|instance| ObjectRef::from_obj_with(instance.as_ref(), main.clone()))
        .collect()
}

/// Run the control loop of one definition until a restart is requested
pub async fn watch_definition(
    client: Client,
    reconciler: Arc<Reconciler>,
    config: &Config,
    restart: RestartSignal,
) -> Result<(), ControllerError> {
    let info = reconciler.info().clone();
    let definition = info.name.clone();
    let main_ar = api_resource(&info.main_type, &info.main);
    let namespaced = info.main.namespaced;
    info!(definition = %definition, main = %info.main_type, "Starting definition watcher");

    let instances: Api<DynamicObject> = Api::all_with(client.clone(), &main_ar);
    let controller = Controller::new_with(instances, watcher::Config::default(), main_ar.clone());
    let store = controller.store();

    // Definition changes re-reconcile every instance
    let definitions: Api<crds::Controller> = Api::namespaced(client.clone(), &config.definition_namespace);
    let controller = {
        let store = store.clone();
        let main_ar = main_ar.clone();
        let definition = definition.clone();
        controller.watches(
            definitions,
            watcher::Config::default().fields(&format!("metadata.name={}", definition)),
            move |changed: crds::Controller| {
                debug!(definition = %changed.name_any(), "Definition changed, re-reconciling all instances");
                all_instances(&store, &main_ar)
            },
        )
    };

    // Config sources owned by the definition re-reconcile every instance
    let secrets: Api<Secret> = Api::namespaced(client.clone(), &config.definition_namespace);
    let controller = {
        let store = store.clone();
        let main_ar = main_ar.clone();
        let definition = definition.clone();
        controller.watches(secrets, watcher::Config::default(), move |secret: Secret| {
            if owned_by_definition(secret.owner_references(), &definition) {
                all_instances(&store, &main_ar)
            } else {
                Vec::new()
            }
        })
    };
    let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), &config.definition_namespace);
    let mut controller = {
        let store = store.clone();
        let main_ar = main_ar.clone();
        let definition = definition.clone();
        controller.watches(config_maps, watcher::Config::default(), move |config_map: ConfigMap| {
            if owned_by_definition(config_map.owner_references(), &definition) {
                all_instances(&store, &main_ar)
            } else {
                Vec::new()
            }
        })
    };

    for (resource_type, type_info) in info.watched() {
        debug!(definition = %definition, dependency = %resource_type, "Watching dependency type");
        let dependent_ar = api_resource(resource_type, type_info);
        let dependents: Api<DynamicObject> = Api::all_with(client.clone(), &dependent_ar);
        let main_ar = main_ar.clone();
        controller = controller.watches_with(
            dependents,
            dependent_ar,
            watcher::Config::default(),
            move |dependent: DynamicObject| {
                owner_refs_to_instances(
                    dependent.owner_references(),
                    dependent.metadata.namespace.as_deref(),
                    &main_ar,
                    namespaced,
                )
            },
        );
    }

    let controller_config = ControllerConfig::default()
        .debounce(config.debounce)
        .concurrency(config.concurrency);

    controller
        .with_config(controller_config)
        .graceful_shutdown_on(restart.requested())
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| {
            let definition = definition.clone();
            async move {
                match res {
                    Ok((instance, _)) => debug!(definition = %definition, instance = %instance, "Reconcile finished"),
                    Err(e) => warn!(definition = %definition, "Controller error: {}", e),
                }
            }
        })
        .await;

    info!(definition = %definition, "Definition watcher stopped");
    Ok(())
}

async fn reconcile(instance: Arc<DynamicObject>, ctx: Arc<Reconciler>) -> Result<Action, ControllerError> {
    let name = instance.name_any();
    let namespace = instance.namespace();
    ctx.reconcile(namespace.as_deref(), &name).await?;
    ctx.reset_backoff(namespace.as_deref(), &name);
    Ok(Action::await_change())
}

fn error_policy(instance: Arc<DynamicObject>, error: &ControllerError, ctx: Arc<Reconciler>) -> Action {
    let name = instance.name_any();
    let namespace = instance.namespace();
    let delay = ctx.next_backoff(namespace.as_deref(), &name);
    error!(
        definition = %ctx.definition_name(),
        namespace = namespace.as_deref(),
        name = %name,
        retry_in = ?delay,
        "Reconciliation failed: {}",
        error
    );
    Action::requeue(delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget_ar() -> ApiResource {
        api_resource(
            &ResourceType::new("example.com", "v1", "Widget"),
            &TypeInfo {
                plural: "widgets".to_string(),
                namespaced: true,
            },
        )
    }

    fn owner(api_version: &str, kind: &str, name: &str, controller: Option<bool>) -> OwnerReference {
        OwnerReference {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            uid: format!("uid-{}", name),
            controller,
            block_owner_deletion: None,
        }
    }

    #[test]
    fn test_api_resource_from_type() {
        let ar = widget_ar();
        assert_eq!(ar.api_version, "example.com/v1");
        assert_eq!(ar.plural, "widgets");

        let core = api_resource(
            &ResourceType::new("", "v1", "Service"),
            &TypeInfo {
                plural: "services".to_string(),
                namespaced: true,
            },
        );
        assert_eq!(core.api_version, "v1");
    }

    #[test]
    fn test_owner_refs_map_to_instances() {
        let owners = vec![
            owner("example.com/v1", "Widget", "a", Some(true)),
            owner("example.com/v1", "Widget", "b", None),
            owner("apps/v1", "Deployment", "c", Some(true)),
            owner("example.com/v2", "Widget", "d", Some(true)),
        ];
        let refs = owner_refs_to_instances(&owners, Some("ns1"), &widget_ar(), true);
        let names: Vec<_> = refs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(refs.iter().all(|r| r.namespace.as_deref() == Some("ns1")));
    }

    #[test]
    fn test_cluster_scoped_main_type_has_no_namespace() {
        let owners = vec![owner("example.com/v1", "Widget", "a", Some(true))];
        let refs = owner_refs_to_instances(&owners, Some("ns1"), &widget_ar(), false);
        assert_eq!(refs[0].namespace, None);
    }

    #[test]
    fn test_owned_by_definition() {
        let owners = vec![owner("declare.microscaler.io/v1alpha1", "Controller", "widgets", None)];
        assert!(owned_by_definition(&owners, "widgets"));
        assert!(!owned_by_definition(&owners, "gadgets"));
        assert!(!owned_by_definition(&[owner("v1", "ConfigMap", "widgets", None)], "widgets"));
    }
}
