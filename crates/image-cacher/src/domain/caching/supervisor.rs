use std::future::Future;

use error_stack::Report;
use futures::stream::FuturesUnordered;
use futures::FutureExt;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::domain::caching::CacheError;
use crate::domain::caching::CachingSession;
use crate::infrastructure::k8s::WorkloadApi;

/// Runs one [`CachingSession`] per identity and joins them.
pub struct Supervisor<A> {
    sessions: Vec<CachingSession<A>>,
}

impl<A: WorkloadApi + 'static> Supervisor<A> {
    pub fn new(sessions: Vec<CachingSession<A>>) -> Self {
        Self { sessions }
    }

    /// Spawns every session and waits until all of them have finished.
    ///
    /// When `shutdown` resolves, each session's own token is cancelled so
    /// every session tears its workload down independently. A fatal error in
    /// one session cancels the others as well; once all are done the first
    /// error is returned.
    pub async fn run<F>(self, shutdown: F) -> Result<(), Report<CacheError>>
    where
        F: Future<Output = ()>,
    {
        let mut tokens = Vec::with_capacity(self.sessions.len());
        let mut running = FuturesUnordered::new();

        for session in self.sessions {
            let token = CancellationToken::new();
            tokens.push(token.clone());
            let identity = session.identity().to_string();
            let handle = tokio::spawn(session.run(token));
            running.push(handle.map(move |joined| (identity, joined)));
        }
        info!("Started {} caching session(s)", tokens.len());

        let cancel_all = |tokens: &[CancellationToken]| {
            for token in tokens {
                token.cancel();
            }
        };

        let shutdown = shutdown.fuse();
        tokio::pin!(shutdown);
        let mut shutdown_requested = false;
        let mut first_error: Option<Report<CacheError>> = None;

        loop {
            tokio::select! {
                () = &mut shutdown, if !shutdown_requested => {
                    info!("Shutdown signal received, stopping all caching sessions");
                    shutdown_requested = true;
                    cancel_all(&tokens);
                }
                finished = running.next() => {
                    let Some((identity, joined)) = finished else {
                        break;
                    };
                    let result = joined.map_err(|e| {
                        Report::new(e).change_context(CacheError::SessionAborted {
                            identity: identity.clone(),
                        })
                    });
                    match result.and_then(|r| r) {
                        Ok(()) => info!("Caching session for {identity} finished"),
                        Err(report) => {
                            error!("Caching session for {identity} failed: {report:?}");
                            if first_error.is_none() {
                                warn!("Stopping remaining caching sessions");
                                cancel_all(&tokens);
                                first_error = Some(report);
                            }
                        }
                    }
                }
            }
        }

        match first_error {
            Some(report) => Err(report),
            None => {
                info!("Shutting down cleanly");
                Ok(())
            }
        }
    }
}
