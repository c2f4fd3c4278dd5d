//! Definition-change watcher
//!
//! Watches Controller definitions and requests a restart whenever the set of
//! running control loops no longer matches them: a definition was deleted,
//! a new one became runnable, a registered one changed its main type or
//! dependency list, or a dependency type that was missing now exists.
//! Definitions whose types are not installed yet are re-checked after a
//! fixed delay, with at most one pending re-check per name.

use crate::bootstrap::{DefinitionShape, Registry, definition_type, parse_definition, probe_type, resolve_main_type};
use crate::error::ControllerError;
use crate::restart::RestartSignal;
use cluster_client::ClusterClient;
use futures::{StreamExt, TryStreamExt};
use kube::{Api, ResourceExt};
use kube_runtime::{WatchStreamExt, watcher};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// What to do about a definition after an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Running loops already match the definition
    Ignore,
    /// Rebuild every loop
    Restart(String),
    /// Look again after the recheck delay
    Recheck,
}

/// Compare a definition against what the last bootstrap registered
pub async fn decide(
    client: &dyn ClusterClient,
    registry: &Registry,
    definition: &crds::Controller,
) -> Result<Decision, ControllerError> {
    let name = definition.name_any();
    let main_type = match resolve_main_type(client, definition).await {
        Ok(main_type) => main_type,
        Err(ControllerError::InvalidDefinition(_, reason)) => {
            if registry.get(&name).is_some() {
                return Ok(Decision::Restart(format!("definition {} became invalid: {}", name, reason)));
            }
            warn!(definition = %name, "Ignoring invalid Controller definition: {}", reason);
            return Ok(Decision::Ignore);
        }
        Err(e) => return Err(e),
    };

    let Some(registered) = registry.get(&name) else {
        let Some(main_type) = main_type else {
            debug!(definition = %name, "Main type not resolvable yet");
            return Ok(Decision::Recheck);
        };
        return Ok(match probe_type(client, &main_type).await? {
            Some(_) => Decision::Restart(format!("new definition {}", name)),
            None => {
                debug!(definition = %name, main = %main_type, "Main type not installed yet");
                Decision::Recheck
            }
        });
    };

    let Some(main_type) = main_type else {
        return Ok(Decision::Restart(format!("main type of definition {} disappeared", name)));
    };
    if DefinitionShape::new(main_type, &definition.spec) != registered.shape {
        return Ok(Decision::Restart(format!("definition {} changed its types", name)));
    }

    if registered.unsupported.is_empty() {
        return Ok(Decision::Ignore);
    }
    for resource_type in &registered.unsupported {
        if probe_type(client, resource_type).await?.is_some() {
            return Ok(Decision::Restart(format!(
                "dependency {} of definition {} now exists",
                resource_type, name
            )));
        }
    }
    Ok(Decision::Recheck)
}

/// Watches definitions for one generation of control loops
pub struct DefinitionWatcher {
    client: Arc<dyn ClusterClient>,
    registry: Registry,
    namespace: String,
    restart: RestartSignal,
    recheck_delay: Duration,
    pending: Mutex<HashSet<String>>,
}

impl DefinitionWatcher {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        registry: Registry,
        namespace: impl Into<String>,
        restart: RestartSignal,
        recheck_delay: Duration,
    ) -> Self {
        Self {
            client,
            registry,
            namespace: namespace.into(),
            restart,
            recheck_delay,
            pending: Mutex::new(HashSet::new()),
        }
    }

    /// Consume definition events until a restart is requested
    pub async fn run(self: Arc<Self>, api: Api<crds::Controller>) -> Result<(), ControllerError> {
        info!(namespace = %self.namespace, definitions = self.registry.len(), "Starting definition-change watcher");
        let token = self.restart.token();
        let mut events = watcher(api, watcher::Config::default())
            .default_backoff()
            .boxed();

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                event = events.try_next() => match event {
                    Ok(Some(event)) => self.handle_event(event).await,
                    Ok(None) => return Err(ControllerError::Watch("definition watch stream ended".to_string())),
                    Err(e) => warn!(namespace = %self.namespace, "Definition watch error: {}", e),
                },
            }
        }

        debug!("Definition-change watcher stopped");
        Ok(())
    }

    /// React to one watch event
    pub async fn handle_event(self: &Arc<Self>, event: watcher::Event<crds::Controller>) {
        match event {
            watcher::Event::Apply(definition) | watcher::Event::InitApply(definition) => {
                self.evaluate(&definition).await;
            }
            watcher::Event::Delete(definition) => {
                self.restart
                    .request(&format!("definition {} deleted", definition.name_any()));
            }
            watcher::Event::Init | watcher::Event::InitDone => {}
        }
    }

    async fn evaluate(self: &Arc<Self>, definition: &crds::Controller) {
        let name = definition.name_any();
        match decide(self.client.as_ref(), &self.registry, definition).await {
            Ok(Decision::Ignore) => {}
            Ok(Decision::Restart(reason)) => self.restart.request(&reason),
            Ok(Decision::Recheck) => {
                self.schedule_recheck(name);
            }
            Err(e) => {
                warn!(definition = %name, "Could not evaluate definition change: {}", e);
                self.schedule_recheck(name);
            }
        }
    }

    /// Re-evaluate a definition after the recheck delay
    ///
    /// Returns false when a re-check for `name` is already pending.
    pub fn schedule_recheck(self: &Arc<Self>, name: String) -> bool {
        {
            let mut pending = match self.pending.lock() {
                Ok(pending) => pending,
                Err(poisoned) => poisoned.into_inner(),
            };
            if !pending.insert(name.clone()) {
                return false;
            }
        }
        debug!(definition = %name, delay = ?self.recheck_delay, "Scheduled definition recheck");

        let watcher = Arc::clone(self);
        let token = self.restart.token();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(watcher.recheck_delay) => {
                    watcher.clear_pending(&name);
                    watcher.recheck(&name).await;
                }
            }
        });
        true
    }

    /// Number of pending re-checks
    pub fn pending(&self) -> usize {
        match self.pending.lock() {
            Ok(pending) => pending.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    fn clear_pending(&self, name: &str) {
        let mut pending = match self.pending.lock() {
            Ok(pending) => pending,
            Err(poisoned) => poisoned.into_inner(),
        };
        pending.remove(name);
    }

    async fn recheck(self: &Arc<Self>, name: &str) {
        let value = match self
            .client
            .get(&definition_type(), Some(self.namespace.as_str()), name)
            .await
        {
            Ok(value) => value,
            // A deletion arrives as its own watch event
            Err(e) if e.is_not_found() => return,
            Err(e) => {
                warn!(definition = %name, "Recheck failed: {}", e);
                self.schedule_recheck(name.to_string());
                return;
            }
        };
        match parse_definition(value) {
            Ok(definition) => self.evaluate(&definition).await,
            Err(e) => warn!(definition = %name, "Recheck found an unreadable definition: {}", e),
        }
    }
}

#[cfg(test)]
#[path = "definition_watcher_test.rs"]
mod definition_watcher_test;
