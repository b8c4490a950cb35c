use std::time::Duration;

use error_stack::Report;
use error_stack::ResultExt;
use k8s_openapi::api::apps::v1::DaemonSet;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::domain::caching::observer;
use crate::domain::caching::observer::WaitOutcome;
use crate::domain::caching::CacheError;
use crate::infrastructure::k8s::KubernetesError;
use crate::infrastructure::k8s::WorkloadApi;
use crate::infrastructure::k8s::WorkloadEventStream;

/// Pause before reopening a watch that ended or failed.
const WATCH_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Lifecycle of the caching workload as seen by its reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum ReconcileState {
    Absent,
    Creating,
    WaitingReady,
    Ready,
    WaitingDeleted,
}

/// Owns the create → ready → delete cycle of one named DaemonSet.
///
/// Every wait is preceded by opening a watch, so the events caused by the
/// following create or delete cannot be missed. Operations are strictly
/// sequential; the reconciler is driven by a single session task.
pub struct Reconciler<A> {
    api: A,
    name: String,
    workload: DaemonSet,
    state: ReconcileState,
}

impl<A: WorkloadApi> Reconciler<A> {
    /// Creates a reconciler for `workload`, which must carry its name.
    pub fn new(api: A, workload: DaemonSet) -> Self {
        let name = workload.metadata.name.clone().unwrap_or_default();
        Self {
            api,
            name,
            workload,
            state: ReconcileState::Absent,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        self.api.namespace()
    }

    /// Last state this reconciler moved the workload to.
    pub fn state(&self) -> ReconcileState {
        self.state
    }

    /// Replaces any existing instance with a fresh one and waits until it is
    /// ready on every node.
    ///
    /// # Errors
    ///
    /// - [`CacheError::CreateFailed`] if the API server rejects the workload
    /// - [`CacheError::DeleteFailed`] if a stale instance cannot be removed
    /// - [`CacheError::DeletedWhileWaiting`] if the new instance disappears
    ///   before it becomes ready
    /// - [`CacheError::WatchFailed`] if the workload cannot be watched
    #[tracing::instrument(skip(self), fields(namespace = %self.namespace(), name = %self.name))]
    pub async fn ensure_exists(&mut self) -> Result<(), Report<CacheError>> {
        if self.instance_exists().await {
            info!("Deleting existing DaemonSet before recreating it");
            self.delete_and_wait().await?;
        }
        self.create_and_wait_ready().await
    }

    /// Deletes the instance if there is one and waits until it is gone.
    /// Does nothing when no instance exists.
    ///
    /// # Errors
    ///
    /// - [`CacheError::DeleteFailed`] if the API server refuses the deletion
    /// - [`CacheError::WatchFailed`] if the workload cannot be watched
    #[tracing::instrument(skip(self), fields(namespace = %self.namespace(), name = %self.name))]
    pub async fn ensure_absent(&mut self) -> Result<(), Report<CacheError>> {
        if !self.instance_exists().await {
            debug!("No DaemonSet to delete");
            self.transition(ReconcileState::Absent);
            return Ok(());
        }
        self.delete_and_wait().await
    }

    /// Periodic self-healing check: recreates the instance if it is missing
    /// or cannot be read.
    #[tracing::instrument(skip(self), fields(namespace = %self.namespace(), name = %self.name))]
    pub async fn ensure_still_exists(&mut self) -> Result<(), Report<CacheError>> {
        info!("Checking that DaemonSet exists");
        match self.api.get(&self.name).await {
            Ok(Some(status)) => {
                info!("DaemonSet present ({status})");
                return Ok(());
            }
            Ok(None) => warn!("DaemonSet missing, recreating it"),
            Err(e) => warn!("Recreating DaemonSet due to error: {e:?}"),
        }
        self.ensure_absent().await?;
        self.ensure_exists().await
    }

    /// Existence check that favours recreation: read errors count as absent.
    async fn instance_exists(&self) -> bool {
        match self.api.get(&self.name).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                warn!("Error getting DaemonSet, treating it as absent: {e:?}");
                false
            }
        }
    }

    async fn create_and_wait_ready(&mut self) -> Result<(), Report<CacheError>> {
        let mut events = self.open_watch().await?;
        self.transition(ReconcileState::Creating);

        if let Err(report) = self.api.create(&self.workload).await {
            if !matches!(
                report.current_context(),
                KubernetesError::AlreadyExists { .. }
            ) {
                return Err(report.change_context(self.create_failed()));
            }

            // an instance appeared after the existence check, replace it once
            warn!("DaemonSet already exists, replacing it: {report:?}");
            drop(events);
            self.delete_and_wait().await?;
            events = self.open_watch().await?;
            self.transition(ReconcileState::Creating);
            self.api
                .create(&self.workload)
                .await
                .change_context_lazy(|| self.create_failed())?;
        }

        info!("Created DaemonSet");
        self.transition(ReconcileState::WaitingReady);
        self.await_ready(events).await?;
        self.transition(ReconcileState::Ready);
        Ok(())
    }

    async fn delete_and_wait(&mut self) -> Result<(), Report<CacheError>> {
        let events = self.open_watch().await?;

        info!("Deleting DaemonSet");
        match self.api.delete(&self.name).await {
            Ok(()) => {}
            Err(report) if report.current_context().is_not_found() => {
                info!("DaemonSet already deleted");
                self.transition(ReconcileState::Absent);
                return Ok(());
            }
            Err(report) => {
                return Err(report.change_context(self.delete_failed()));
            }
        }

        self.transition(ReconcileState::WaitingDeleted);
        self.await_deleted(events).await?;
        self.transition(ReconcileState::Absent);
        Ok(())
    }

    async fn await_ready(&self, mut events: WorkloadEventStream) -> Result<(), Report<CacheError>> {
        loop {
            let outcome =
                observer::wait_until_ready(&mut events, self.api.namespace(), &self.name).await?;
            if outcome == WaitOutcome::Satisfied {
                return Ok(());
            }

            warn!("Watch ended before DaemonSet became ready, reopening");
            tokio::time::sleep(WATCH_RETRY_DELAY).await;
            events = self.open_watch().await?;
            match self.api.get(&self.name).await {
                Ok(Some(status)) if status.is_ready() => {
                    info!("DaemonSet became ready while the watch was closed ({status})");
                    return Ok(());
                }
                Ok(Some(status)) => debug!("DaemonSet still rolling out ({status})"),
                Ok(None) => {
                    return Err(Report::new(self.deleted_while_waiting()));
                }
                Err(e) => warn!("Error getting DaemonSet while resuming readiness wait: {e:?}"),
            }
        }
    }

    async fn await_deleted(&self, mut events: WorkloadEventStream) -> Result<(), Report<CacheError>> {
        loop {
            if observer::wait_until_deleted(&mut events, &self.name).await == WaitOutcome::Satisfied {
                return Ok(());
            }

            warn!("Watch ended before DaemonSet deletion was observed, reopening");
            tokio::time::sleep(WATCH_RETRY_DELAY).await;
            events = self.open_watch().await?;
            match self.api.get(&self.name).await {
                Ok(None) => {
                    info!("DaemonSet deleted while the watch was closed");
                    return Ok(());
                }
                Ok(Some(_)) => debug!("DaemonSet still terminating"),
                Err(e) => warn!("Error getting DaemonSet while resuming deletion wait: {e:?}"),
            }
        }
    }

    async fn open_watch(&self) -> Result<WorkloadEventStream, Report<CacheError>> {
        self.api
            .watch(&self.name)
            .await
            .change_context_lazy(|| self.watch_failed())
    }

    fn transition(&mut self, next: ReconcileState) {
        if self.state != next {
            debug!("DaemonSet {}: {} -> {}", self.name, self.state, next);
            self.state = next;
        }
    }

    fn create_failed(&self) -> CacheError {
        CacheError::CreateFailed {
            namespace: self.api.namespace().to_string(),
            name: self.name.clone(),
        }
    }

    fn delete_failed(&self) -> CacheError {
        CacheError::DeleteFailed {
            namespace: self.api.namespace().to_string(),
            name: self.name.clone(),
        }
    }

    fn watch_failed(&self) -> CacheError {
        CacheError::WatchFailed {
            namespace: self.api.namespace().to_string(),
            name: self.name.clone(),
        }
    }

    fn deleted_while_waiting(&self) -> CacheError {
        CacheError::DeletedWhileWaiting {
            namespace: self.api.namespace().to_string(),
            name: self.name.clone(),
        }
    }
}
