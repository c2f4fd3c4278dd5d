//! Template engines for declarative controllers
//!
//! A definition's source files are compiled into an [`Engine`] that turns a
//! [`TemplateInput`] (the reconciled instance, merged config and supported
//! dependency types) into a [`TemplateOutput`] (objects to apply and a new
//! status).
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//! use template_engine::{NoopReader, TemplateInput, Templater, select};
//!
//! let sources = BTreeMap::from([(
//!     "main.rhai".to_string(),
//!     "fn reconcile(request) { #{ apply: [], status: #{ seen: request.object.metadata.name } } }".to_string(),
//! )]);
//! let engine = select(&sources).unwrap();
//!
//! let input = TemplateInput {
//!     object: serde_json::json!({"metadata": {"name": "my-name"}}),
//!     ..Default::default()
//! };
//! let output = engine.template(Arc::new(NoopReader), &input).unwrap();
//! assert_eq!(output.status, Some(serde_json::json!({"seen": "my-name"})));
//! ```

pub mod contract;
pub mod error;
pub mod factory;
pub mod jinja;
pub mod reader;
pub mod script;
pub mod value;

pub use contract::{TemplateInput, TemplateOutput};
pub use error::TemplateError;
pub use factory::{Engine, Language, Templater, detect_language, select};
pub use jinja::JinjaTemplater;
pub use reader::{NoopReader, ObjectReader};
pub use script::ScriptTemplater;
pub use value::canonicalize;
