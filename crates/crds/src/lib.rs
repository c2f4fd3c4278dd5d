//! Declarative Controller CRD Definitions
//!
//! Kubernetes Custom Resource Definitions read by the definition controller.

pub mod controller;
pub mod references;

pub use controller::*;
pub use references::*;

/// Annotation on a dependent object selecting how it is owned by its instance
///
/// Objects annotated with any other key, such as `ctrl.declare.dev/ownership`,
/// get the default controller ownership.
pub const OWNERSHIP_ANNOTATION: &str = "declare.microscaler.io/ownership";

/// `OWNERSHIP_ANNOTATION` value: no owner reference is set
pub const OWNERSHIP_NONE: &str = "none";

/// `OWNERSHIP_ANNOTATION` value: owner reference without `controller: true`
pub const OWNERSHIP_NON_CONTROLLER: &str = "non-controller";
