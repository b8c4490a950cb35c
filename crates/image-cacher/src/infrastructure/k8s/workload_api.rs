use error_stack::Report;
use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::DaemonSet;
use kube::api::DeleteParams;
use kube::api::ListParams;
use kube::api::PostParams;
use kube::api::WatchEvent;
use kube::api::WatchParams;
use kube::Api;
use kube::Client;
use tracing::debug;

use crate::domain::workload::ReadinessStatus;
use crate::infrastructure::k8s::types::KubernetesError;
use crate::infrastructure::k8s::types::WorkloadEvent;

/// Finite stream of changes to a single named workload.
pub type WorkloadEventStream = BoxStream<'static, Result<WorkloadEvent, Report<KubernetesError>>>;

/// The API server operations the reconciler needs, scoped to one namespace.
#[async_trait::async_trait]
pub trait WorkloadApi: Send + Sync {
    /// Namespace every call operates in
    fn namespace(&self) -> &str;

    /// Reads the workload's rollout status, `None` when it does not exist.
    async fn get(&self, name: &str) -> Result<Option<ReadinessStatus>, Report<KubernetesError>>;

    /// Creates the workload.
    ///
    /// # Errors
    ///
    /// - [`KubernetesError::AlreadyExists`] if an object with the same name exists
    /// - [`KubernetesError::Rejected`] if the API server refuses the definition
    async fn create(&self, workload: &DaemonSet) -> Result<(), Report<KubernetesError>>;

    /// Deletes the workload with foreground propagation, so the API server
    /// only reports it gone once its pods are gone.
    ///
    /// # Errors
    ///
    /// - [`KubernetesError::NotFound`] if there is nothing to delete
    async fn delete(&self, name: &str) -> Result<(), Report<KubernetesError>>;

    /// Opens a watch on the workload called `name`. Only changes made
    /// after the call are reported.
    async fn watch(&self, name: &str) -> Result<WorkloadEventStream, Report<KubernetesError>>;
}

/// [`WorkloadApi`] backed by the Kubernetes `apps/v1` DaemonSet API.
pub struct KubeWorkloadApi {
    api: Api<DaemonSet>,
    namespace: String,
}

impl KubeWorkloadApi {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
        }
    }

    fn report(&self, err: kube::Error, name: &str, action: &str) -> Report<KubernetesError> {
        Report::new(KubernetesError::from_kube(&err, &self.namespace, name))
            .attach_printable(format!("{action} DaemonSet {}/{name}: {err}", self.namespace))
    }
}

#[async_trait::async_trait]
impl WorkloadApi for KubeWorkloadApi {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn get(&self, name: &str) -> Result<Option<ReadinessStatus>, Report<KubernetesError>> {
        self.api
            .get_opt(name)
            .await
            .map(|ds| ds.as_ref().map(ReadinessStatus::from))
            .map_err(|e| self.report(e, name, "get"))
    }

    async fn create(&self, workload: &DaemonSet) -> Result<(), Report<KubernetesError>> {
        let name = workload.metadata.name.as_deref().unwrap_or_default();
        self.api
            .create(&PostParams::default(), workload)
            .await
            .map(|_| ())
            .map_err(|e| self.report(e, name, "create"))
    }

    async fn delete(&self, name: &str) -> Result<(), Report<KubernetesError>> {
        self.api
            .delete(name, &DeleteParams::foreground())
            .await
            .map(|_| ())
            .map_err(|e| self.report(e, name, "delete"))
    }

    async fn watch(&self, name: &str) -> Result<WorkloadEventStream, Report<KubernetesError>> {
        let selector = format!("metadata.name={name}");
        let list = self
            .api
            .list_metadata(&ListParams::default().fields(&selector))
            .await
            .map_err(|e| self.report(e, name, "list"))?;
        let version = watch_start_version(list.metadata.resource_version);

        let params = WatchParams::default().fields(&selector);
        let stream = self
            .api
            .watch(&params, &version)
            .await
            .map_err(|e| self.report(e, name, "watch"))?;

        Ok(stream
            .filter_map(|event| futures::future::ready(map_watch_event(event)))
            .boxed())
    }
}

/// Falls back to "0", which lets the API server choose, when the list
/// carried no resource version.
fn watch_start_version(list_version: Option<String>) -> String {
    list_version
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "0".to_string())
}

fn map_watch_event(
    event: kube::Result<WatchEvent<DaemonSet>>,
) -> Option<Result<WorkloadEvent, Report<KubernetesError>>> {
    match event {
        Ok(WatchEvent::Added(ds)) => Some(Ok(WorkloadEvent::Added((&ds).into()))),
        Ok(WatchEvent::Modified(ds)) => Some(Ok(WorkloadEvent::Modified((&ds).into()))),
        Ok(WatchEvent::Deleted(_)) => Some(Ok(WorkloadEvent::Deleted)),
        Ok(WatchEvent::Bookmark(_)) => {
            debug!("Skipping watch bookmark");
            None
        }
        Ok(WatchEvent::Error(resp)) => Some(Err(Report::new(KubernetesError::WatchFailed {
            message: format!("{} ({})", resp.message, resp.code),
        }))),
        Err(e) => Some(Err(Report::new(KubernetesError::WatchFailed {
            message: format!("Watch stream error: {e}"),
        }))),
    }
}
