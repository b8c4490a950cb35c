use std::time::Duration;

use error_stack::Report;
use tokio::time::interval_at;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::domain::caching::CacheError;
use crate::domain::caching::Reconciler;
use crate::infrastructure::k8s::WorkloadApi;

/// Keeps one identity's caching workload alive until shutdown.
pub struct CachingSession<A> {
    identity: String,
    reconciler: Reconciler<A>,
    interval: Duration,
}

impl<A: WorkloadApi> CachingSession<A> {
    pub fn new(identity: impl Into<String>, reconciler: Reconciler<A>, interval: Duration) -> Self {
        Self {
            identity: identity.into(),
            reconciler,
            interval,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Runs the session until `shutdown` is cancelled.
    ///
    /// Starts from a clean slate (any leftover instance is replaced), then
    /// checks the instance every `interval`. Cancellation is only observed
    /// between operations: an in-flight create or delete always completes
    /// first. On shutdown the workload is deleted before returning.
    ///
    /// # Errors
    ///
    /// Any fatal [`CacheError`] raised by the reconciler. The workload may
    /// be left behind in that case.
    #[tracing::instrument(skip_all, fields(identity = %self.identity))]
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), Report<CacheError>> {
        info!(
            "Starting caching session for DaemonSet {}/{}",
            self.reconciler.namespace(),
            self.reconciler.name()
        );
        self.reconciler.ensure_absent().await?;
        self.reconciler.ensure_exists().await?;

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, removing DaemonSet");
                    self.reconciler.ensure_absent().await?;
                    info!("Caching session finished");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    self.reconciler.ensure_still_exists().await?;
                }
            }
        }
    }
}
