//! Template errors

use thiserror::Error;

/// Errors that can occur while selecting or running a template
///
/// Every variant means "templating failed": no output of a failed
/// invocation is ever used.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// No source file has a recognized extension
    #[error("no template language recognized among sources {0:?}")]
    NoLanguage(Vec<String>),

    /// Source files use more than one language
    #[error("sources mix template languages: {0:?}")]
    MixedLanguages(Vec<String>),

    /// A source file failed to parse
    #[error("failed to compile {file}: {message}")]
    Compile {
        /// Source filename
        file: String,
        /// Parser diagnostic
        message: String,
    },

    /// Evaluation failed
    #[error("template evaluation failed: {0}")]
    Runtime(String),

    /// Input or output could not be converted between host and engine values
    #[error("template output conversion failed: {0}")]
    Conversion(String),

    /// An `apply` entry lacks `apiVersion`, `kind` or `metadata.name`
    #[error("apply entry {index} has no {field}")]
    MissingIdentity {
        /// Position of the entry in `apply`
        index: usize,
        /// Dotted path of the missing field
        field: &'static str,
    },

    /// The entry point could not be determined or is missing
    #[error("template entry point: {0}")]
    Entry(String),

    /// The evaluation thread panicked
    #[error("template evaluation panicked: {0}")]
    Panicked(String),
}
