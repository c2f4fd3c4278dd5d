//! Data-language engine (Jinja templates rendering YAML)
//!
//! All sources are loaded into one environment so they can `include` and
//! `import` each other. The entry template renders a YAML document of shape
//! `{apply: [...], status: ...}`.
//!
//! Functions available to templates:
//! - `get_object({apiVersion, kind, metadata: {name, namespace?}})`: the
//!   object, or `{}` if it does not exist; namespace defaults to the
//!   reconciled instance's
//! - `from_json(text)`: parse a JSON string
//! - `parse_int(text, base)`: parse an integer in base 2 to 36

use crate::contract::{TemplateInput, TemplateOutput};
use crate::error::TemplateError;
use crate::reader::{ObjectQuery, ObjectReader};
use crate::value::canonicalize;
use minijinja::{Environment, Error, ErrorKind, UndefinedBehavior, Value, context};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Compiled Jinja sources of one definition
#[derive(Debug, Clone)]
pub struct JinjaTemplater {
    env: Environment<'static>,
    entry: String,
}

impl JinjaTemplater {
    /// Compile all sources and pick the entry template
    ///
    /// The entry is the only source, or the one whose name starts with `main.`.
    pub fn new(sources: &BTreeMap<String, String>) -> Result<Self, TemplateError> {
        let entry = entry_file(sources)?;

        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        for (file, source) in sources {
            env.add_template_owned(file.clone(), source.clone())
                .map_err(|e| TemplateError::Compile {
                    file: file.clone(),
                    message: e.to_string(),
                })?;
        }
        env.add_function("from_json", from_json);
        env.add_function("parse_int", parse_int);

        debug!(entry = %entry, templates = sources.len(), "Compiled Jinja templates");
        Ok(Self { env, entry })
    }

    /// Render the entry template for one request
    pub fn render(&self, reader: Arc<dyn ObjectReader>, input: &TemplateInput) -> Result<TemplateOutput, TemplateError> {
        let mut env = self.env.clone();
        let default_namespace = input.object_namespace().map(str::to_string);
        env.add_function("get_object", move |object: Value| -> Result<Value, Error> {
            let query = serde_json::to_value(&object)
                .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
                .and_then(|object| {
                    ObjectQuery::parse(&object, default_namespace.as_deref())
                        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e))
                })?;
            let found = query
                .run(reader.as_ref())
                .map_err(|e| Error::new(ErrorKind::InvalidOperation, e))?;
            Ok(Value::from_serialize(canonicalize(found)))
        });

        let template = env
            .get_template(&self.entry)
            .map_err(|e| TemplateError::Entry(e.to_string()))?;
        let rendered = template
            .render(context! { request => Value::from_serialize(input.to_request()) })
            .map_err(|e| TemplateError::Runtime(describe(&e)))?;

        let document: serde_json::Value = serde_yaml::from_str(&rendered)
            .map_err(|e| TemplateError::Conversion(format!("rendered document is not YAML: {}", e)))?;
        TemplateOutput::from_value(document)
    }
}

fn entry_file(sources: &BTreeMap<String, String>) -> Result<String, TemplateError> {
    if sources.len() == 1 {
        if let Some(only) = sources.keys().next() {
            return Ok(only.clone());
        }
    }
    let mains: Vec<&String> = sources.keys().filter(|file| file.starts_with("main.")).collect();
    match mains.as_slice() {
        [main] => Ok((*main).clone()),
        [] => Err(TemplateError::Entry(format!(
            "{} templates and none named main.*",
            sources.len()
        ))),
        _ => Err(TemplateError::Entry(format!("several main templates: {:?}", mains))),
    }
}

/// Message of a minijinja error including its chain of causes
fn describe(err: &Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(&format!(": {}", cause));
        source = cause.source();
    }
    message
}

fn from_json(text: &str) -> Result<Value, Error> {
    let parsed: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("from_json: {}", e)))?;
    Ok(Value::from_serialize(canonicalize(parsed)))
}

fn parse_int(text: &str, base: u32) -> Result<i64, Error> {
    if !(2..=36).contains(&base) {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("parse_int: base {} is not in 2..=36", base),
        ));
    }
    i64::from_str_radix(text.trim(), base)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("parse_int({:?}, {}): {}", text, base, e)))
}
