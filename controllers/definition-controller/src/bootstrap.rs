//! Bootstrap: resolve every Controller definition into runtime metadata.
//!
//! For each definition the main type is resolved (from `for`, or from a
//! legacy `crdName` through its CustomResourceDefinition) and every declared
//! dependency type is probed. A type "exists" when discovery resolves it and
//! listing it does not return not-found. Types that do not exist are left
//! out of the supported set and never watched.

use crate::error::ControllerError;
use cluster_client::{ClusterClient, ClusterError, ResourceType, TypeInfo};
use crds::{Controller, ControllerSpec};
use kube::Resource;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// The resource type of Controller definitions
pub fn definition_type() -> ResourceType {
    ResourceType::new(Controller::group(&()), Controller::version(&()), Controller::kind(&()))
}

/// A declared dependency type and what discovery found for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyInfo {
    /// Declared type
    pub resource_type: ResourceType,
    /// `None` when the type does not exist in the cluster
    pub info: Option<TypeInfo>,
    /// Whether changes to objects of this type re-trigger their owner
    pub watch: bool,
}

impl DependencyInfo {
    /// Whether the type exists in the cluster
    pub fn is_supported(&self) -> bool {
        self.info.is_some()
    }
}

/// Resolved metadata of one definition, immutable for one generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerInfo {
    /// Definition name
    pub name: String,
    /// Type whose instances are reconciled
    pub main_type: ResourceType,
    /// Discovery info of the main type
    pub main: TypeInfo,
    /// Declared dependencies in declaration order
    pub dependencies: Vec<DependencyInfo>,
}

impl ControllerInfo {
    /// Supported dependency types keyed `<kind>.<version>.<group>`
    pub fn supported(&self) -> BTreeMap<String, bool> {
        self.dependencies
            .iter()
            .filter(|dep| dep.is_supported())
            .map(|dep| (dep.resource_type.key(), true))
            .collect()
    }

    /// Discovery info of a supported dependency type
    pub fn supported_type(&self, resource_type: &ResourceType) -> Option<&TypeInfo> {
        self.dependencies
            .iter()
            .find(|dep| &dep.resource_type == resource_type)
            .and_then(|dep| dep.info.as_ref())
    }

    /// Supported dependency types to watch, each listed once
    pub fn watched(&self) -> Vec<(&ResourceType, &TypeInfo)> {
        let mut watched: Vec<(&ResourceType, &TypeInfo)> = Vec::new();
        for dep in &self.dependencies {
            if let (true, Some(info)) = (dep.watch, dep.info.as_ref()) {
                if !watched.iter().any(|(ty, _)| *ty == &dep.resource_type) {
                    watched.push((&dep.resource_type, info));
                }
            }
        }
        watched
    }

    /// Declared dependency types that do not exist
    pub fn unsupported(&self) -> Vec<ResourceType> {
        self.dependencies
            .iter()
            .filter(|dep| !dep.is_supported())
            .map(|dep| dep.resource_type.clone())
            .collect()
    }

    /// What this definition registers watches for
    pub fn shape(&self) -> DefinitionShape {
        DefinitionShape {
            main_type: self.main_type.clone(),
            dependencies: self
                .dependencies
                .iter()
                .map(|dep| (dep.resource_type.clone(), dep.watch))
                .collect(),
        }
    }
}

/// The parts of a definition that determine watch registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionShape {
    /// Type whose instances are reconciled
    pub main_type: ResourceType,
    /// Dependency types with their watch flags, in declaration order
    pub dependencies: Vec<(ResourceType, bool)>,
}

impl DefinitionShape {
    /// Shape of a definition spec with an already resolved main type
    pub fn new(main_type: ResourceType, spec: &ControllerSpec) -> Self {
        Self {
            main_type,
            dependencies: spec
                .dependencies
                .iter()
                .map(|dep| (ResourceType::from_api_version(&dep.api_version, &dep.kind), dep.watch))
                .collect(),
        }
    }
}

/// What the last bootstrap registered for a definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredDefinition {
    /// Main type and dependency list at bootstrap
    pub shape: DefinitionShape,
    /// Declared dependency types that did not exist at bootstrap
    pub unsupported: Vec<ResourceType>,
}

/// Definitions registered by the last bootstrap, by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    entries: HashMap<String, RegisteredDefinition>,
}

impl Registry {
    /// Register every resolved definition
    pub fn from_infos(infos: &[ControllerInfo]) -> Self {
        Self {
            entries: infos
                .iter()
                .map(|info| {
                    (
                        info.name.clone(),
                        RegisteredDefinition {
                            shape: info.shape(),
                            unsupported: info.unsupported(),
                        },
                    )
                })
                .collect(),
        }
    }

    /// Registration of a definition, by name
    pub fn get(&self, name: &str) -> Option<&RegisteredDefinition> {
        self.entries.get(name)
    }

    /// Number of registered definitions
    #[allow(clippy::len_without_is_empty, reason = "only used for logging")]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Output of one bootstrap
#[derive(Debug, Clone, Default)]
pub struct Bootstrap {
    /// Definitions whose main type exists
    pub controllers: Vec<ControllerInfo>,
    pub registry: Registry,
}

/// Deserialize a definition read through the dynamic client
pub fn parse_definition(value: Value) -> Result<Controller, ControllerError> {
    Ok(serde_json::from_value(value)?)
}

/// Resolve the main type of a definition; `Ok(None)` if its CRD does not exist
pub async fn resolve_main_type(
    client: &dyn ClusterClient,
    definition: &Controller,
) -> Result<Option<ResourceType>, ControllerError> {
    let name = definition.metadata.name.clone().unwrap_or_default();
    if let Some(for_type) = &definition.spec.for_type {
        return Ok(Some(ResourceType::from_api_version(&for_type.api_version, &for_type.kind)));
    }
    let Some(crd_name) = &definition.spec.crd_name else {
        return Err(ControllerError::InvalidDefinition(
            name,
            "neither spec.for nor spec.crdName is set".to_string(),
        ));
    };

    let crd = match client
        .get(&ResourceType::custom_resource_definition(), None, crd_name)
        .await
    {
        Ok(crd) => crd,
        Err(e) if e.is_not_found() => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    main_type_from_crd(&crd)
        .map(Some)
        .ok_or_else(|| ControllerError::InvalidDefinition(name, format!("CRD {} has no storage version", crd_name)))
}

/// Group, kind and storage version of a CustomResourceDefinition
fn main_type_from_crd(crd: &Value) -> Option<ResourceType> {
    let spec = crd.get("spec")?;
    let group = spec.get("group")?.as_str()?;
    let kind = spec.pointer("/names/kind")?.as_str()?;
    let version = spec
        .get("versions")?
        .as_array()?
        .iter()
        .find(|v| v.get("storage").and_then(Value::as_bool) == Some(true))?
        .get("name")?
        .as_str()?;
    Some(ResourceType::new(group, version, kind))
}

/// Whether a type exists; errors other than not-found are returned
pub async fn probe_type(
    client: &dyn ClusterClient,
    resource_type: &ResourceType,
) -> Result<Option<TypeInfo>, ControllerError> {
    let Some(info) = client.discover(resource_type).await? else {
        return Ok(None);
    };
    match client.list(resource_type, None).await {
        Ok(_) => Ok(Some(info)),
        Err(ClusterError::NotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Resolve one definition; `Ok(None)` when its main type does not exist
pub async fn resolve_definition(
    client: &dyn ClusterClient,
    definition: &Controller,
) -> Result<Option<ControllerInfo>, ControllerError> {
    let name = definition.metadata.name.clone().unwrap_or_default();
    let Some(main_type) = resolve_main_type(client, definition).await? else {
        return Ok(None);
    };
    let Some(main) = probe_type(client, &main_type).await? else {
        return Ok(None);
    };

    let mut dependencies = Vec::with_capacity(definition.spec.dependencies.len());
    for dep in &definition.spec.dependencies {
        let resource_type = ResourceType::from_api_version(&dep.api_version, &dep.kind);
        let info = probe_type(client, &resource_type).await?;
        if info.is_none() {
            warn!(definition = %name, dependency = %resource_type, "Dependency type not found, it will not be applied or watched");
        }
        dependencies.push(DependencyInfo {
            resource_type,
            info,
            watch: dep.watch,
        });
    }

    Ok(Some(ControllerInfo {
        name,
        main_type,
        main,
        dependencies,
    }))
}

/// Resolve all definitions in `namespace`
///
/// Definitions that are malformed or whose main type does not exist are
/// skipped; any other cluster error aborts the bootstrap.
pub async fn bootstrap(client: &dyn ClusterClient, namespace: &str) -> Result<Bootstrap, ControllerError> {
    let definitions = client.list(&definition_type(), Some(namespace)).await?;
    info!(namespace, count = definitions.len(), "Bootstrapping Controller definitions");

    let mut controllers = Vec::new();
    for value in definitions {
        let definition = match parse_definition(value) {
            Ok(definition) => definition,
            Err(e) => {
                warn!(namespace, "Skipping unreadable Controller definition: {}", e);
                continue;
            }
        };
        let name = definition.metadata.name.clone().unwrap_or_default();

        match resolve_definition(client, &definition).await {
            Ok(Some(info)) => {
                debug!(
                    definition = %name,
                    main = %info.main_type,
                    supported = info.supported().len(),
                    "Resolved Controller definition"
                );
                controllers.push(info);
            }
            Ok(None) => {
                warn!(definition = %name, "Main type of Controller definition not found, skipping");
            }
            Err(ControllerError::InvalidDefinition(name, reason)) => {
                warn!(definition = %name, "Skipping invalid Controller definition: {}", reason);
            }
            Err(e) => return Err(e),
        }
    }

    let registry = Registry::from_infos(&controllers);
    Ok(Bootstrap { controllers, registry })
}

#[cfg(test)]
#[path = "bootstrap_test.rs"]
mod bootstrap_test;
