//! Dynamic Kubernetes cluster client
//!
//! Treats the API server as a store of untyped JSON objects so a controller
//! can reconcile resource types it only learns about at runtime.
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{ClusterClient, KubeClusterClient, ResourceType};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = KubeClusterClient::new(kube::Client::try_default().await?, Duration::from_secs(30));
//!
//! let services = ResourceType::from_api_version("v1", "Service");
//! if client.discover(&services).await?.is_some() {
//!     let items = client.list(&services, Some("default")).await?;
//!     println!("{} services", items.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Discovery**: resolve any group/version/kind, absent types report `None`
//! - **Server-side apply**: forced apply under a caller-chosen field manager
//! - **Guarded status writes**: `resourceVersion` conflicts surface as `ClusterError::Conflict`
//! - **Events**: fire-and-forget Kubernetes Events on any object
//! - **Mocking**: in-memory client and event recorder behind the `test-util` feature

pub mod client;
pub mod error;
pub mod events;
#[path = "trait.rs"]
pub mod cluster_trait;
pub mod types;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::KubeClusterClient;
pub use cluster_trait::ClusterClient;
pub use error::ClusterError;
pub use events::{EventPublisher, KubeEventPublisher, actions, object_reference, reasons};
pub use kube::runtime::events::EventType;
pub use types::{ResourceType, TypeInfo, object_name, object_namespace};
#[cfg(feature = "test-util")]
pub use mock::{MockClusterClient, RecordingEventPublisher};
