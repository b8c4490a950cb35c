//! Kubernetes integration module.
//!
//! The caching core only talks to the API server through [`WorkloadApi`];
//! [`KubeWorkloadApi`] implements it over the `apps/v1` DaemonSet API.
//!
//! The main components are:
//! - [`WorkloadApi`]: get/create/delete/watch for one named DaemonSet
//! - [`WorkloadEvent`]: watch events reduced to what the reconciler needs
//! - [`KubernetesError`]: API failures classified by how callers react to them

pub mod types;
pub mod workload_api;

pub use types::KubernetesError;
pub use types::WorkloadEvent;
pub use workload_api::KubeWorkloadApi;
pub use workload_api::WorkloadApi;
pub use workload_api::WorkloadEventStream;
