//! Blocking waits over a workload watch stream.
//!
//! Both waits consume events from a stream the caller opened before
//! triggering the transition it expects, and leave the stream with the
//! caller. A stream is finite: when it ends (or yields an error) the wait
//! reports [`WaitOutcome::StreamEnded`] and the caller decides whether to
//! reopen it.

use error_stack::Report;
use futures::Stream;
use futures::StreamExt;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::domain::caching::CacheError;
use crate::infrastructure::k8s::KubernetesError;
use crate::infrastructure::k8s::WorkloadEvent;

/// How a wait over a watch stream finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The awaited condition was observed
    Satisfied,
    /// The stream closed or failed before the condition was observed
    StreamEnded,
}

/// Waits for a `Modified` event reporting every scheduled pod ready.
///
/// # Errors
///
/// - [`CacheError::DeletedWhileWaiting`] if the workload is deleted before it
///   becomes ready
pub async fn wait_until_ready<S>(
    events: &mut S,
    namespace: &str,
    name: &str,
) -> Result<WaitOutcome, Report<CacheError>>
where
    S: Stream<Item = Result<WorkloadEvent, Report<KubernetesError>>> + Unpin,
{
    info!("Waiting for DaemonSet {name} to be ready");
    while let Some(event) = events.next().await {
        match event {
            Ok(WorkloadEvent::Modified(status)) if status.is_ready() => {
                info!("All nodes scheduled in DaemonSet {name} are ready ({status})");
                return Ok(WaitOutcome::Satisfied);
            }
            Ok(WorkloadEvent::Modified(status)) => {
                debug!("DaemonSet {name} not ready yet ({status})");
            }
            Ok(WorkloadEvent::Added(status)) => {
                debug!("DaemonSet {name} added ({status})");
            }
            Ok(WorkloadEvent::Deleted) => {
                return Err(Report::new(CacheError::DeletedWhileWaiting {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                }));
            }
            Err(e) => {
                warn!("Watch on DaemonSet {name} failed while waiting for readiness: {e:?}");
                return Ok(WaitOutcome::StreamEnded);
            }
        }
    }
    Ok(WaitOutcome::StreamEnded)
}

/// Waits for a `Deleted` event, ignoring everything else.
pub async fn wait_until_deleted<S>(events: &mut S, name: &str) -> WaitOutcome
where
    S: Stream<Item = Result<WorkloadEvent, Report<KubernetesError>>> + Unpin,
{
    while let Some(event) = events.next().await {
        match event {
            Ok(WorkloadEvent::Deleted) => {
                info!("DaemonSet {name} deleted");
                return WaitOutcome::Satisfied;
            }
            Ok(other) => debug!("Ignoring {other:?} while waiting for deletion of {name}"),
            Err(e) => {
                warn!("Watch on DaemonSet {name} failed while waiting for deletion: {e:?}");
                return WaitOutcome::StreamEnded;
            }
        }
    }
    WaitOutcome::StreamEnded
}
