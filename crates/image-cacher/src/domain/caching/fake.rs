//! In-memory stand-in for the DaemonSet API used by the caching tests.
//!
//! Creates and deletes are applied immediately and announced to every open
//! watch on the same name, mimicking the API server's event order. A watch
//! only reports changes made after it opened.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use error_stack::Report;
use futures::channel::mpsc;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::DaemonSet;

use crate::domain::workload::ReadinessStatus;
use crate::infrastructure::k8s::KubernetesError;
use crate::infrastructure::k8s::WorkloadApi;
use crate::infrastructure::k8s::WorkloadEvent;
use crate::infrastructure::k8s::WorkloadEventStream;

type Item = Result<WorkloadEvent, Report<KubernetesError>>;

#[derive(Default)]
struct FakeCluster {
    nodes: i32,
    objects: HashMap<String, ReadinessStatus>,
    watchers: Vec<(String, mpsc::UnboundedSender<Item>)>,
    created: Vec<DaemonSet>,
    pending_deletions: Vec<String>,
    creates: usize,
    deletes: usize,
    watches: usize,
    failing_gets: usize,
    reject_creates: bool,
    panic_creates: bool,
    hold_readiness: bool,
    defer_deletions: bool,
}

impl FakeCluster {
    fn emit(&mut self, name: &str, event: WorkloadEvent) {
        self.watchers.retain(|(watched, sender)| {
            watched != name || sender.unbounded_send(Ok(event)).is_ok()
        });
    }

    fn remove(&mut self, name: &str) {
        if self.objects.remove(name).is_some() {
            self.emit(name, WorkloadEvent::Deleted);
        }
    }
}

/// Cloneable handle to a shared fake cluster namespace.
#[derive(Clone)]
pub(crate) struct FakeWorkloadApi {
    namespace: String,
    cluster: Arc<Mutex<FakeCluster>>,
}

impl FakeWorkloadApi {
    /// A namespace on a cluster with `nodes` schedulable nodes.
    pub(crate) fn new(namespace: &str, nodes: i32) -> Self {
        Self {
            namespace: namespace.to_string(),
            cluster: Arc::new(Mutex::new(FakeCluster {
                nodes,
                ..Default::default()
            })),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut FakeCluster) -> T) -> T {
        f(&mut self.cluster.lock().unwrap())
    }

    pub(crate) fn create_calls(&self) -> usize {
        self.with(|c| c.creates)
    }

    pub(crate) fn delete_calls(&self) -> usize {
        self.with(|c| c.deletes)
    }

    pub(crate) fn watch_calls(&self) -> usize {
        self.with(|c| c.watches)
    }

    pub(crate) fn instance_count(&self) -> usize {
        self.with(|c| c.objects.len())
    }

    pub(crate) fn exists(&self, name: &str) -> bool {
        self.with(|c| c.objects.contains_key(name))
    }

    pub(crate) fn status(&self, name: &str) -> Option<ReadinessStatus> {
        self.with(|c| c.objects.get(name).copied())
    }

    pub(crate) fn last_created(&self) -> Option<DaemonSet> {
        self.with(|c| c.created.last().cloned())
    }

    /// Seeds an instance left over from an earlier run.
    pub(crate) fn insert_existing(&self, name: &str, status: ReadinessStatus) {
        self.with(|c| c.objects.insert(name.to_string(), status));
    }

    /// Makes the next `count` reads fail with a transient error.
    pub(crate) fn fail_next_gets(&self, count: usize) {
        self.with(|c| c.failing_gets = count);
    }

    pub(crate) fn reject_creates(&self) {
        self.with(|c| c.reject_creates = true);
    }

    /// Makes the next create panic, as a bug in the calling task would.
    pub(crate) fn panic_on_create(&self) {
        self.with(|c| c.panic_creates = true);
    }

    /// Keeps new instances unready until [`Self::mark_ready`].
    pub(crate) fn hold_readiness(&self, hold: bool) {
        self.with(|c| c.hold_readiness = hold);
    }

    /// Keeps deleted instances terminating until [`Self::finish_deletions`].
    pub(crate) fn defer_deletions(&self, defer: bool) {
        self.with(|c| c.defer_deletions = defer);
    }

    pub(crate) fn mark_ready(&self, name: &str) {
        self.with(|c| {
            let nodes = c.nodes;
            if let Some(status) = c.objects.get_mut(name) {
                *status = ReadinessStatus::new(nodes, nodes);
                let status = *status;
                c.emit(name, WorkloadEvent::Modified(status));
            }
        });
    }

    /// Deletes an instance behind the reconciler's back.
    pub(crate) fn remove_out_of_band(&self, name: &str) {
        self.with(|c| c.remove(name));
    }

    pub(crate) fn pending_deletions(&self) -> usize {
        self.with(|c| c.pending_deletions.len())
    }

    /// Completes deferred deletions and announces them.
    pub(crate) fn finish_deletions(&self) {
        self.with(|c| {
            for name in std::mem::take(&mut c.pending_deletions) {
                c.remove(&name);
            }
        });
    }

    /// Completes deferred deletions without telling any watcher.
    pub(crate) fn finish_deletions_silently(&self) {
        self.with(|c| {
            for name in std::mem::take(&mut c.pending_deletions) {
                c.objects.remove(&name);
            }
        });
    }

    /// Ends every open watch, as the API server does on its watch timeout.
    pub(crate) fn close_watches(&self) {
        self.with(|c| c.watchers.clear());
    }
}

#[async_trait::async_trait]
impl WorkloadApi for FakeWorkloadApi {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn get(&self, name: &str) -> Result<Option<ReadinessStatus>, Report<KubernetesError>> {
        self.with(|c| {
            if c.failing_gets > 0 {
                c.failing_gets -= 1;
                return Err(Report::new(KubernetesError::Transient {
                    message: "connection reset".to_string(),
                }));
            }
            Ok(c.objects.get(name).copied())
        })
    }

    async fn create(&self, workload: &DaemonSet) -> Result<(), Report<KubernetesError>> {
        let name = workload.metadata.name.clone().unwrap_or_default();
        let namespace = self.namespace.clone();
        // panic outside the lock so other handles keep working
        if self.with(|c| std::mem::take(&mut c.panic_creates)) {
            panic!("create of {name} panicked");
        }
        self.with(|c| {
            c.creates += 1;
            if c.reject_creates {
                return Err(Report::new(KubernetesError::Rejected {
                    code: 422,
                    message: "DaemonSet is invalid".to_string(),
                }));
            }
            if c.objects.contains_key(&name) {
                return Err(Report::new(KubernetesError::AlreadyExists { namespace, name }));
            }

            c.created.push(workload.clone());
            let rolling_out = ReadinessStatus::new(c.nodes, 0);
            c.objects.insert(name.clone(), rolling_out);
            c.emit(&name, WorkloadEvent::Added(ReadinessStatus::default()));
            c.emit(&name, WorkloadEvent::Modified(rolling_out));

            if !c.hold_readiness {
                let ready = ReadinessStatus::new(c.nodes, c.nodes);
                c.objects.insert(name.clone(), ready);
                c.emit(&name, WorkloadEvent::Modified(ready));
            }
            Ok(())
        })
    }

    async fn delete(&self, name: &str) -> Result<(), Report<KubernetesError>> {
        let namespace = self.namespace.clone();
        self.with(|c| {
            c.deletes += 1;
            if !c.objects.contains_key(name) {
                return Err(Report::new(KubernetesError::NotFound {
                    namespace,
                    name: name.to_string(),
                }));
            }
            if c.defer_deletions {
                c.pending_deletions.push(name.to_string());
            } else {
                c.remove(name);
            }
            Ok(())
        })
    }

    async fn watch(&self, name: &str) -> Result<WorkloadEventStream, Report<KubernetesError>> {
        let (sender, receiver) = mpsc::unbounded();
        self.with(|c| {
            c.watches += 1;
            c.watchers.push((name.to_string(), sender));
        });
        Ok(receiver.boxed())
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;

    #[test(tokio::test)]
    async fn watch_skips_state_from_before_it_opened() {
        let api = FakeWorkloadApi::new("ns", 2);
        api.insert_existing("cacher", ReadinessStatus::new(2, 2));

        let events = api.watch("cacher").await.expect("watch");
        api.remove_out_of_band("cacher");
        api.close_watches();

        let seen: Vec<WorkloadEvent> = events
            .filter_map(|e| futures::future::ready(e.ok()))
            .collect()
            .await;
        assert_eq!(seen, vec![WorkloadEvent::Deleted]);
    }
}
