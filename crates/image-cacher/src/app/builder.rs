use anyhow::Result;

use crate::app::Application;
use crate::config::CacherConfig;
use crate::domain::caching::CachingSession;
use crate::domain::caching::Reconciler;
use crate::domain::caching::Supervisor;
use crate::domain::workload::WorkloadBuilder;
use crate::infrastructure::k8s::KubeWorkloadApi;
use crate::infrastructure::kube_client;

/// Application builder
pub struct ApplicationBuilder {
    config: CacherConfig,
}

impl ApplicationBuilder {
    pub fn new(config: CacherConfig) -> Self {
        Self { config }
    }

    /// Resolves credentials and builds one session per identity.
    pub async fn build(self) -> Result<Application> {
        tracing::info!("Building application components...");

        let base = kube_client::base_config(&self.config.credentials)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to configure Kubernetes access: {e:?}"))?;

        let workloads = WorkloadBuilder::new(self.config.idle_image.clone());
        let mut sessions = Vec::with_capacity(self.config.identities.len());

        for identity in &self.config.identities {
            let client = kube_client::impersonated_client(&base, identity)
                .map_err(|e| anyhow::anyhow!("{e:?}"))?;
            let api = KubeWorkloadApi::new(client, &self.config.namespace);
            let workload = workloads.build(
                &self.config.namespace,
                &identity.workload_name,
                &self.config.images,
                Some(&identity.username),
            );

            tracing::info!(
                "Caching {} image(s) in DaemonSet {}/{} as {}",
                self.config.images.len(),
                self.config.namespace,
                identity.workload_name,
                identity.username
            );
            sessions.push(CachingSession::new(
                identity.username.clone(),
                Reconciler::new(api, workload),
                self.config.caching_interval,
            ));
        }

        Ok(Application::new(Supervisor::new(sessions)))
    }
}
