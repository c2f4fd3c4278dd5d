//! Controller-specific error types.
//!
//! This module defines error types specific to the definition controller
//! that are not covered by the library crates' errors.

use cluster_client::ClusterError;
use kube::Error as KubeError;
use template_engine::TemplateError;
use thiserror::Error;

/// Errors that can occur in the definition controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Cluster API error from the dynamic client
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Template selection or evaluation failed
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A Controller definition cannot be used
    #[error("Invalid definition {0}: {1}")]
    InvalidDefinition(String, String),

    /// A template produced an object that may not be applied
    #[error("Object rejected: {0}")]
    Rejected(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
