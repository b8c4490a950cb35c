use thiserror::Error;

use crate::domain::workload::ReadinessStatus;

/// A change observed on the watched workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadEvent {
    /// The workload was created after the watch opened
    Added(ReadinessStatus),
    /// The workload status changed
    Modified(ReadinessStatus),
    /// The workload is gone
    Deleted,
}

/// Errors that can occur during Kubernetes operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KubernetesError {
    #[error("Failed to connect to Kubernetes API: {message}")]
    ConnectionFailed { message: String },
    #[error("DaemonSet {name} not found in namespace {namespace}")]
    NotFound { namespace: String, name: String },
    #[error("DaemonSet {name} already exists in namespace {namespace}")]
    AlreadyExists { namespace: String, name: String },
    #[error("Request rejected by the API server ({code}): {message}")]
    Rejected { code: u16, message: String },
    #[error("Transient Kubernetes API error: {message}")]
    Transient { message: String },
    #[error("Failed to watch DaemonSet: {message}")]
    WatchFailed { message: String },
}

impl KubernetesError {
    /// Classifies a kube client error for the object `namespace`/`name`.
    pub fn from_kube(err: &kube::Error, namespace: &str, name: &str) -> Self {
        match err {
            kube::Error::Api(resp) => match resp.code {
                404 => Self::NotFound {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                },
                409 => Self::AlreadyExists {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                },
                // throttling and timeouts are worth retrying
                408 | 429 => Self::Transient {
                    message: resp.message.clone(),
                },
                code @ 400..=499 => Self::Rejected {
                    code,
                    message: resp.message.clone(),
                },
                _ => Self::Transient {
                    message: resp.message.clone(),
                },
            },
            other => Self::Transient {
                message: other.to_string(),
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
