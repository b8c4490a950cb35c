use k8s_openapi::api::apps::v1::DaemonSet;

/// Read-only rollout view of the caching workload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, derive_more::Display)]
#[display("{ready}/{desired} ready")]
pub struct ReadinessStatus {
    /// Number of nodes that should run the workload's pod.
    pub desired: i32,
    /// Number of nodes whose pod is ready.
    pub ready: i32,
}

impl ReadinessStatus {
    pub fn new(desired: i32, ready: i32) -> Self {
        Self { desired, ready }
    }

    /// Every scheduled pod is ready, and at least one was scheduled.
    pub fn is_ready(&self) -> bool {
        self.desired > 0 && self.ready == self.desired
    }
}

impl From<&DaemonSet> for ReadinessStatus {
    fn from(ds: &DaemonSet) -> Self {
        ds.status
            .as_ref()
            .map(|s| Self::new(s.desired_number_scheduled, s.number_ready))
            .unwrap_or_default()
    }
}
