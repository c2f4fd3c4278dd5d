//! Controller configuration from environment variables

use crate::error::ControllerError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Namespace holding Controller definitions and their config sources
    pub definition_namespace: String,
    /// Prefix of the server-side-apply field manager
    pub field_manager_prefix: String,
    /// Concurrent reconciles per definition
    pub concurrency: u16,
    /// Debounce window of each control loop
    pub debounce: Duration,
    /// Deadline of every cluster API call
    pub api_timeout: Duration,
    /// Delay before re-checking a definition whose types are not installed yet
    pub recheck_delay: Duration,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            definition_namespace: "default".to_string(),
            field_manager_prefix: "declare".to_string(),
            concurrency: 4,
            debounce: Duration::from_secs(1),
            api_timeout: Duration::from_secs(30),
            recheck_delay: Duration::from_secs(10),
            log_format: LogFormat::Text,
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let defaults = Self::default();
        let string = |key: &str, default: String| lookup(key).filter(|v| !v.is_empty()).unwrap_or(default);

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            None | Some("") | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ControllerError::InvalidConfig(format!(
                    "LOG_FORMAT must be text or json, got {:?}",
                    other
                )));
            }
        };

        let concurrency: u16 = parse(&lookup, "RECONCILE_CONCURRENCY", defaults.concurrency)?;
        if concurrency == 0 {
            return Err(ControllerError::InvalidConfig(
                "RECONCILE_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            definition_namespace: string("DEFINITION_NAMESPACE", defaults.definition_namespace),
            field_manager_prefix: string("FIELD_MANAGER_PREFIX", defaults.field_manager_prefix),
            concurrency,
            debounce: Duration::from_secs(parse(&lookup, "RECONCILE_DEBOUNCE_SECS", defaults.debounce.as_secs())?),
            api_timeout: Duration::from_secs(parse(&lookup, "API_TIMEOUT_SECS", defaults.api_timeout.as_secs())?),
            recheck_delay: Duration::from_secs(parse(&lookup, "RECHECK_DELAY_SECS", defaults.recheck_delay.as_secs())?),
            log_format,
        })
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ControllerError>
where
    T::Err: std::fmt::Display,
{
    match lookup(key).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| ControllerError::InvalidConfig(format!("{}={:?}: {}", key, value, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ControllerError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        assert_eq!(load(&[]).unwrap(), Config::default());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("DEFINITION_NAMESPACE", "declare-system"),
            ("FIELD_MANAGER_PREFIX", "acme"),
            ("RECONCILE_CONCURRENCY", "8"),
            ("API_TIMEOUT_SECS", " 5 "),
            ("LOG_FORMAT", "json"),
        ])
        .unwrap();
        assert_eq!(config.definition_namespace, "declare-system");
        assert_eq!(config.field_manager_prefix, "acme");
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.api_timeout, Duration::from_secs(5));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.recheck_delay, Duration::from_secs(10));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            load(&[("RECONCILE_CONCURRENCY", "many")]),
            Err(ControllerError::InvalidConfig(_))
        ));
        assert!(matches!(
            load(&[("RECONCILE_CONCURRENCY", "0")]),
            Err(ControllerError::InvalidConfig(_))
        ));
        assert!(matches!(load(&[("LOG_FORMAT", "xml")]), Err(ControllerError::InvalidConfig(_))));
    }
}
