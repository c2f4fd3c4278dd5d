//! Engine selection
//!
//! The language of a definition follows from its source filenames alone:
//! exactly one recognized language must be present. Files with other
//! extensions are ignored.
//!
//! Only Jinja (`.j2`, `.jinja`, `.jinja2`) and Rhai (`.rhai`) sources are
//! recognized. Definitions written for Jsonnet or JavaScript engines
//! (`.jsonnet`, `.libsonnet`, `.js`) select no language and fail with
//! [`TemplateError::NoLanguage`]; they have to be ported to one of the two.

use crate::contract::{TemplateInput, TemplateOutput};
use crate::error::TemplateError;
use crate::jinja::JinjaTemplater;
use crate::reader::ObjectReader;
use crate::script::ScriptTemplater;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Recognized template languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Language {
    /// Jinja templates rendering YAML (`.j2`, `.jinja`, `.jinja2`)
    Data,
    /// Rhai scripts (`.rhai`)
    Script,
}

impl Language {
    /// Language of a source file, by extension
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, extension) = filename.rsplit_once('.')?;
        match extension {
            "j2" | "jinja" | "jinja2" => Some(Self::Data),
            "rhai" => Some(Self::Script),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data => write!(f, "jinja"),
            Self::Script => write!(f, "rhai"),
        }
    }
}

/// Runs a definition's templates against one request
pub trait Templater: Send + Sync {
    /// Evaluate the templates
    ///
    /// # Arguments
    /// * `reader` - Lookup used by `get_object`
    /// * `input` - Instance, config and supported types
    fn template(&self, reader: Arc<dyn ObjectReader>, input: &TemplateInput) -> Result<TemplateOutput, TemplateError>;
}

/// A compiled engine of one of the recognized languages
#[derive(Debug, Clone)]
pub enum Engine {
    /// Jinja templates rendered to YAML documents
    Data(JinjaTemplater),
    /// Rhai scripts with a `reconcile` entry point
    Script(ScriptTemplater),
}

impl Engine {
    /// Language of this engine
    pub fn language(&self) -> Language {
        match self {
            Self::Data(_) => Language::Data,
            Self::Script(_) => Language::Script,
        }
    }
}

impl Templater for Engine {
    fn template(&self, reader: Arc<dyn ObjectReader>, input: &TemplateInput) -> Result<TemplateOutput, TemplateError> {
        match self {
            Self::Data(jinja) => jinja.render(reader, input),
            Self::Script(script) => script.run(reader, input),
        }
    }
}

/// Determine the one language used by `sources`
pub fn detect_language(sources: &BTreeMap<String, String>) -> Result<Language, TemplateError> {
    let languages: BTreeSet<Language> = sources
        .keys()
        .filter_map(|file| Language::from_filename(file))
        .collect();

    let mut iter = languages.iter();
    match (iter.next(), iter.next()) {
        (Some(language), None) => Ok(*language),
        (None, _) => Err(TemplateError::NoLanguage(sources.keys().cloned().collect())),
        (Some(_), Some(_)) => Err(TemplateError::MixedLanguages(
            languages.iter().map(ToString::to_string).collect(),
        )),
    }
}

/// Select and compile the engine for a definition's sources
///
/// Fails before compiling anything when the language is ambiguous.
pub fn select(sources: &BTreeMap<String, String>) -> Result<Engine, TemplateError> {
    let language = detect_language(sources)?;
    let files: BTreeMap<String, String> = sources
        .iter()
        .filter(|(file, _)| Language::from_filename(file) == Some(language))
        .map(|(file, source)| (file.clone(), source.clone()))
        .collect();

    match language {
        Language::Data => JinjaTemplater::new(&files).map(Engine::Data),
        Language::Script => ScriptTemplater::new(&files).map(Engine::Script),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources(names: &[&str]) -> BTreeMap<String, String> {
        names
            .iter()
            .map(|name| (name.to_string(), String::new()))
            .collect()
    }

    #[test]
    fn test_language_from_filename() {
        assert_eq!(Language::from_filename("main.j2"), Some(Language::Data));
        assert_eq!(Language::from_filename("svc.jinja2"), Some(Language::Data));
        assert_eq!(Language::from_filename("main.rhai"), Some(Language::Script));
        assert_eq!(Language::from_filename("README.md"), None);
        assert_eq!(Language::from_filename("rhai"), None);
    }

    #[test]
    fn test_unrecognized_files_ignored() {
        assert_eq!(detect_language(&sources(&["main.rhai", "notes.txt"])).unwrap(), Language::Script);
    }

    #[test]
    fn test_mixed_languages_rejected() {
        let err = detect_language(&sources(&["main.rhai", "main.j2"])).unwrap_err();
        assert!(matches!(err, TemplateError::MixedLanguages(ref langs) if langs.len() == 2));
    }

    #[test]
    fn test_no_language_rejected() {
        assert!(matches!(
            detect_language(&sources(&["notes.txt"])),
            Err(TemplateError::NoLanguage(_))
        ));
        assert!(matches!(detect_language(&BTreeMap::new()), Err(TemplateError::NoLanguage(_))));
    }

    #[test]
    fn test_jsonnet_and_javascript_sources_not_recognized() {
        let err = detect_language(&sources(&["main.jsonnet", "lib.libsonnet", "helpers.js"])).unwrap_err();
        assert!(matches!(err, TemplateError::NoLanguage(ref files) if files.len() == 3));
    }

    #[test]
    fn test_mixed_languages_fail_before_compiling() {
        // Both files are invalid; selection must report the language clash, not a compile error
        let files = BTreeMap::from([
            ("main.rhai".to_string(), "fn sync(".to_string()),
            ("main.j2".to_string(), "{% if %}".to_string()),
        ]);
        assert!(matches!(select(&files), Err(TemplateError::MixedLanguages(_))));
    }
}
