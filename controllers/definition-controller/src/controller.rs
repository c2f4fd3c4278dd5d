//! Registrar: runs one generation of control loops.
//!
//! A generation bootstraps the definitions, starts one control loop per
//! resolved definition plus the definition-change watcher, and lasts until
//! a restart is requested, shutdown begins, or a task stops unexpectedly.

use crate::backoff::ExponentialBackoff;
use crate::bootstrap::{Bootstrap, bootstrap};
use crate::config::Config;
use crate::definition_watcher::DefinitionWatcher;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::restart::RestartSignal;
use crate::watcher::watch_definition;
use cluster_client::{ClusterClient, EventPublisher};
use kube::{Api, Client};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Upper bound on waiting for loops to drain at the end of a generation
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// How a generation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Definitions changed; bootstrap again
    Restart,
    /// The process is shutting down
    Shutdown,
}

pub struct Registrar {
    client: Client,
    cluster: Arc<dyn ClusterClient>,
    events: Arc<dyn EventPublisher>,
    config: Config,
}

impl Registrar {
    pub fn new(
        client: Client,
        cluster: Arc<dyn ClusterClient>,
        events: Arc<dyn EventPublisher>,
        config: Config,
    ) -> Self {
        Self {
            client,
            cluster,
            events,
            config,
        }
    }

    /// Run one generation until it ends
    pub async fn run(&self, shutdown: &CancellationToken) -> Result<Outcome, ControllerError> {
        let namespace = self.config.definition_namespace.clone();
        let Bootstrap { controllers, registry } = bootstrap(self.cluster.as_ref(), &namespace).await?;
        info!(
            namespace = %namespace,
            definitions = controllers.len(),
            "Starting control loops"
        );

        let restart = RestartSignal::new();
        let mut tasks: JoinSet<Result<(), ControllerError>> = JoinSet::new();

        for info in controllers {
            let definition = info.name.clone();
            let reconciler = Arc::new(Reconciler::new(
                Arc::clone(&self.cluster),
                Arc::clone(&self.events),
                info,
                namespace.clone(),
                &self.config.field_manager_prefix,
            ));
            let client = self.client.clone();
            let config = self.config.clone();
            let restart = restart.clone();
            tasks.spawn(async move {
                watch_definition(client, reconciler, &config, restart)
                    .await
                    .map_err(|e| ControllerError::Watch(format!("definition {}: {}", definition, e)))
            });
        }

        let definition_watcher = Arc::new(DefinitionWatcher::new(
            Arc::clone(&self.cluster),
            registry,
            namespace.clone(),
            restart.clone(),
            self.config.recheck_delay,
        ));
        let definitions: Api<crds::Controller> = Api::namespaced(self.client.clone(), &namespace);
        tasks.spawn(definition_watcher.run(definitions));

        let result = tokio::select! {
            _ = restart.requested() => Ok(Outcome::Restart),
            _ = shutdown.cancelled() => Ok(Outcome::Shutdown),
            joined = tasks.join_next() => match joined {
                Some(Ok(Ok(()))) => Err(ControllerError::Watch("a control loop stopped unexpectedly".to_string())),
                Some(Ok(Err(e))) => Err(e),
                Some(Err(e)) => Err(ControllerError::Watch(format!("a control loop panicked: {}", e))),
                None => Err(ControllerError::Watch("no control loops running".to_string())),
            },
        };

        // Every loop shuts down gracefully on the same token
        restart.token().cancel();
        drain(&mut tasks).await;
        result
    }
}

/// Run generations until shutdown
///
/// A failed generation is logged and retried after a growing delay; a
/// generation that ends in a restart resets the delay.
pub async fn supervise<F, Fut>(
    shutdown: &CancellationToken,
    mut backoff: ExponentialBackoff,
    mut run_generation: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Outcome, ControllerError>>,
{
    let initial = backoff.clone();
    loop {
        match run_generation().await {
            Ok(Outcome::Restart) => {
                info!("Definitions changed, restarting control loops");
                backoff = initial.clone();
            }
            Ok(Outcome::Shutdown) => return,
            Err(e) => {
                let delay = backoff.next_backoff();
                error!(retry_in = ?delay, "Control loops failed: {}", e);
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
        if shutdown.is_cancelled() {
            return;
        }
    }
}

async fn drain(tasks: &mut JoinSet<Result<(), ControllerError>>) {
    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Control loop ended with error during drain: {}", e),
                Err(e) => error!("Control loop panicked during drain: {}", e),
            }
        }
    })
    .await;

    if drained.is_err() {
        warn!(remaining = tasks.len(), timeout = ?DRAIN_TIMEOUT, "Aborting control loops that did not stop in time");
        tasks.abort_all();
    } else {
        debug!("All control loops stopped");
    }
}
