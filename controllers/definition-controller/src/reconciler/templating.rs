//! Engine selection and evaluation

use super::Reconciler;
use crate::object_reader::ClusterObjectReader;
use crds::Controller;
use std::sync::Arc;
use template_engine::{Engine, TemplateError, TemplateInput, TemplateOutput, Templater, select};
use tokio::runtime::Handle;
use tracing::debug;

/// Compiled engine of one definition generation
pub(crate) struct CachedEngine {
    generation: Option<i64>,
    engine: Arc<Engine>,
}

impl Reconciler {
    /// Engine for the definition, compiled once per generation
    pub(crate) fn engine(&self, definition: &Controller) -> Result<Arc<Engine>, TemplateError> {
        let generation = definition.metadata.generation;
        let mut cache = match self.engine_cache.lock() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(cached) = cache.as_ref().filter(|c| c.generation == generation) {
            return Ok(cached.engine.clone());
        }

        let engine = Arc::new(select(&definition.spec.source)?);
        debug!(
            definition = %self.info.name,
            generation,
            language = %engine.language(),
            "Compiled template engine"
        );
        *cache = Some(CachedEngine {
            generation,
            engine: engine.clone(),
        });
        Ok(engine)
    }

    /// Run the definition's templates on a blocking thread
    pub(crate) async fn run_templates(
        &self,
        definition: &Controller,
        input: &TemplateInput,
    ) -> Result<TemplateOutput, TemplateError> {
        let engine = self.engine(definition)?;
        let reader = Arc::new(ClusterObjectReader::new(self.client.clone(), Handle::current()));
        let input = input.clone();

        tokio::task::spawn_blocking(move || engine.template(reader, &input))
            .await
            .map_err(|e| TemplateError::Panicked(e.to_string()))?
    }
}
