//! Cluster client errors

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when talking to the Kubernetes API server
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Object or resource type does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Write rejected because the object changed since it was read
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Call exceeded the client deadline
    #[error("Timed out after {0:?}: {1}")]
    Timeout(Duration, String),

    /// Any other API server or transport error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Object is missing fields required for the call
    #[error("Invalid object: {0}")]
    InvalidObject(String),
}

impl ClusterError {
    /// Classify a kube error: 404 and 409 become `NotFound` and `Conflict`
    pub fn from_kube(err: kube::Error, what: impl Into<String>) -> Self {
        match err {
            kube::Error::Api(ref response) if response.code == 404 => Self::NotFound(what.into()),
            kube::Error::Api(ref response) if response.code == 409 => Self::Conflict(what.into()),
            other => Self::Kube(other),
        }
    }

    /// Whether the object or type does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether the write lost an optimistic-concurrency race
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
