use anyhow::Result;

use crate::app::tasks;
use crate::domain::caching::Supervisor;
use crate::infrastructure::k8s::KubeWorkloadApi;

/// Application core structure
pub struct Application {
    supervisor: Supervisor<KubeWorkloadApi>,
}

impl Application {
    pub fn new(supervisor: Supervisor<KubeWorkloadApi>) -> Self {
        Self { supervisor }
    }

    /// Runs every caching session until a termination signal has been
    /// handled by all of them, or one of them fails.
    pub async fn run(self) -> Result<()> {
        tracing::info!("Starting all caching sessions...");

        self.supervisor
            .run(tasks::shutdown_signal())
            .await
            .map_err(|e| anyhow::anyhow!("Caching failed: {e:?}"))?;

        tracing::info!("Application run completed");
        Ok(())
    }
}
