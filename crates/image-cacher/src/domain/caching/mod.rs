//! Image caching control loop.
//!
//! - [`observer`]: turns a workload watch stream into "ready" / "deleted" waits
//! - [`Reconciler`]: create → wait ready → delete → wait deleted for one workload
//! - [`CachingSession`]: drives one identity's reconciler until shutdown
//! - [`Supervisor`]: runs one session per identity and joins them

use thiserror::Error;

pub mod observer;
pub mod reconciler;
pub mod session;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod fake;

pub use observer::WaitOutcome;
pub use reconciler::ReconcileState;
pub use reconciler::Reconciler;
pub use session::CachingSession;
pub use supervisor::Supervisor;

/// Fatal conditions for a caching session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Failed to create DaemonSet {name} in namespace {namespace}")]
    CreateFailed { namespace: String, name: String },
    #[error("Failed to delete DaemonSet {name} in namespace {namespace}")]
    DeleteFailed { namespace: String, name: String },
    #[error("Failed to watch DaemonSet {name} in namespace {namespace}")]
    WatchFailed { namespace: String, name: String },
    #[error("DaemonSet {name} in namespace {namespace} was deleted while waiting for it to become ready")]
    DeletedWhileWaiting { namespace: String, name: String },
    #[error("Caching session for identity {identity} aborted")]
    SessionAborted { identity: String },
}
