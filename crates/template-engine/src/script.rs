//! Script-language engine (Rhai)
//!
//! Sources are compiled in filename order and merged into one program whose
//! `reconcile(request)` function returns `#{ apply: [...], status: ... }`.

use crate::contract::{TemplateInput, TemplateOutput};
use crate::error::TemplateError;
use crate::reader::{ObjectQuery, ObjectReader};
use rhai::{AST, Dynamic, Engine, EvalAltResult, Map, Scope};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Name of the function every script program must define
const ENTRY_POINT: &str = "reconcile";

/// Compiled Rhai program of one definition
#[derive(Debug, Clone)]
pub struct ScriptTemplater {
    ast: AST,
}

impl ScriptTemplater {
    /// Compile and merge all sources
    pub fn new(sources: &BTreeMap<String, String>) -> Result<Self, TemplateError> {
        let engine = Engine::new();
        let mut ast = AST::empty();
        for (file, source) in sources {
            let compiled = engine.compile(source).map_err(|e| TemplateError::Compile {
                file: file.clone(),
                message: e.to_string(),
            })?;
            ast = ast.merge(&compiled);
        }
        debug!(files = sources.len(), "Compiled Rhai program");
        Ok(Self { ast })
    }

    /// Call `reconcile(request)` for one request
    pub fn run(&self, reader: Arc<dyn ObjectReader>, input: &TemplateInput) -> Result<TemplateOutput, TemplateError> {
        let engine = engine_for(reader, input.object_namespace().map(str::to_string));
        let request = rhai::serde::to_dynamic(input.to_request())
            .map_err(|e| TemplateError::Conversion(format!("request: {}", e)))?;

        let result = engine
            .call_fn::<Dynamic>(&mut Scope::new(), &self.ast, ENTRY_POINT, (request,))
            .map_err(|e| match *e {
                EvalAltResult::ErrorFunctionNotFound(ref signature, _) if signature.starts_with(ENTRY_POINT) => {
                    TemplateError::Entry(format!("no {}(request) function defined", ENTRY_POINT))
                }
                ref other => TemplateError::Runtime(other.to_string()),
            })?;

        let output: serde_json::Value = rhai::serde::from_dynamic(&result)
            .map_err(|e| TemplateError::Conversion(e.to_string()))?;
        TemplateOutput::from_value(output)
    }
}

/// An engine with the host functions bound to one request
fn engine_for(reader: Arc<dyn ObjectReader>, default_namespace: Option<String>) -> Engine {
    let mut engine = Engine::new();
    engine.register_fn("get_object", move |object: Map| -> Result<Dynamic, Box<EvalAltResult>> {
        let object: serde_json::Value = rhai::serde::from_dynamic(&Dynamic::from_map(object))?;
        let query = ObjectQuery::parse(&object, default_namespace.as_deref())?;
        let found = query.run(reader.as_ref())?;
        rhai::serde::to_dynamic(found)
    });
    engine
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::NoopReader;
    use serde_json::json;

    fn program(files: &[(&str, &str)]) -> ScriptTemplater {
        let sources = files
            .iter()
            .map(|(name, body)| (name.to_string(), body.to_string()))
            .collect();
        ScriptTemplater::new(&sources).unwrap()
    }

    #[test]
    fn test_files_are_merged() {
        let templater = program(&[
            ("a-helpers.rhai", "fn labels(name) { #{ app: name } }"),
            ("main.rhai", "fn reconcile(request) { #{ apply: [], status: labels(request.object.metadata.name) } }"),
        ]);
        let input = TemplateInput {
            object: json!({"metadata": {"name": "web"}}),
            ..Default::default()
        };
        let output = templater.run(Arc::new(NoopReader), &input).unwrap();
        assert_eq!(output.status, Some(json!({"app": "web"})));
    }

    #[test]
    fn test_missing_entry_point() {
        let templater = program(&[("main.rhai", "fn other(request) { 1 }")]);
        let err = templater.run(Arc::new(NoopReader), &TemplateInput::default()).unwrap_err();
        assert!(matches!(err, TemplateError::Entry(_)));
    }

    #[test]
    fn test_runtime_error() {
        let templater = program(&[("main.rhai", r#"fn reconcile(request) { throw "boom"; }"#)]);
        let err = templater.run(Arc::new(NoopReader), &TemplateInput::default()).unwrap_err();
        assert!(matches!(err, TemplateError::Runtime(ref msg) if msg.contains("boom")));
    }

    #[test]
    fn test_compile_error_names_file() {
        let sources = BTreeMap::from([("main.rhai".to_string(), "fn reconcile(request) {".to_string())]);
        let err = ScriptTemplater::new(&sources).unwrap_err();
        assert!(matches!(err, TemplateError::Compile { ref file, .. } if file == "main.rhai"));
    }
}
