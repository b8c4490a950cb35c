use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::apps::v1::DaemonSetSpec;
use k8s_openapi::api::core::v1::Container;
use k8s_openapi::api::core::v1::PodSpec;
use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::ImageSet;

pub const NAME_LABEL: &str = "app.kubernetes.io/name";
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY: &str = "image-cacher";
pub const IDENTITY_ANNOTATION: &str = "image-cacher.io/identity";

pub const IDLE_CONTAINER_NAME: &str = "idle";
pub const DEFAULT_IDLE_IMAGE: &str = "busybox";

const PULL_COMMAND: &str = "sleep 5";
const IDLE_COMMAND: &str = "sleep 60";
const TERMINATION_GRACE_PERIOD_SECONDS: i64 = 1;

/// Builds the node-wide caching DaemonSet.
///
/// Every image becomes an init container that only has to start (forcing the
/// kubelet to pull it) and exit. The single main container idles for a minute
/// so the rollout becomes observable as ready before it is torn down.
#[derive(Debug, Clone)]
pub struct WorkloadBuilder {
    idle_image: String,
}

impl Default for WorkloadBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_IMAGE)
    }
}

impl WorkloadBuilder {
    pub fn new(idle_image: impl Into<String>) -> Self {
        Self {
            idle_image: idle_image.into(),
        }
    }

    /// Produces the DaemonSet for `namespace`/`name` pulling every image in
    /// `images`. `identity`, when given, is recorded as an annotation.
    pub fn build(
        &self,
        namespace: &str,
        name: &str,
        images: &ImageSet,
        identity: Option<&str>,
    ) -> DaemonSet {
        let labels = selector_labels(name);

        let mut metadata_labels = labels.clone();
        metadata_labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string());

        let annotations = identity.map(|identity| {
            BTreeMap::from([(IDENTITY_ANNOTATION.to_string(), identity.to_string())])
        });

        let init_containers = images
            .iter()
            .map(|entry| shell_container(&entry.name, &entry.image, PULL_COMMAND))
            .collect();

        DaemonSet {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(metadata_labels.clone()),
                annotations,
                ..Default::default()
            },
            spec: Some(DaemonSetSpec {
                selector: LabelSelector {
                    match_labels: Some(labels),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(metadata_labels),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        termination_grace_period_seconds: Some(TERMINATION_GRACE_PERIOD_SECONDS),
                        // no constraints: the pod lands on every schedulable node
                        node_selector: None,
                        init_containers: Some(init_containers),
                        containers: vec![shell_container(
                            IDLE_CONTAINER_NAME,
                            &self.idle_image,
                            IDLE_COMMAND,
                        )],
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

fn selector_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(NAME_LABEL.to_string(), name.to_string())])
}

fn shell_container(name: &str, image: &str, script: &str) -> Container {
    Container {
        name: name.to_string(),
        image: Some(image.to_string()),
        command: Some(vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            script.to_string(),
        ]),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn init_containers(ds: &DaemonSet) -> Vec<(String, String)> {
        ds.spec
            .as_ref()
            .and_then(|s| s.template.spec.as_ref())
            .and_then(|p| p.init_containers.as_ref())
            .map(|cs| {
                cs.iter()
                    .map(|c| (c.name.clone(), c.image.clone().unwrap_or_default()))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn trailing_separator_builds_two_init_steps() {
        let images = ImageSet::parse("a=img1;b=img2;");
        let ds = WorkloadBuilder::default().build("ns", "cacher", &images, None);

        assert_eq!(
            init_containers(&ds),
            vec![
                ("a".to_string(), "img1".to_string()),
                ("b".to_string(), "img2".to_string())
            ]
        );
    }

    #[test]
    fn malformed_entry_is_not_built() {
        let images = ImageSet::parse("a=img1;bad-entry;b=img2");
        let ds = WorkloadBuilder::default().build("ns", "cacher", &images, None);

        let names: Vec<String> = init_containers(&ds).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn selector_matches_template_labels() {
        let images = ImageSet::parse("a=img1");
        let ds = WorkloadBuilder::default().build("ns", "cacher", &images, None);
        let spec = ds.spec.expect("spec");

        let selector = spec.selector.match_labels.expect("selector labels");
        let template_labels = spec
            .template
            .metadata
            .and_then(|m| m.labels)
            .expect("template labels");

        assert!(!selector.is_empty());
        for (key, value) in &selector {
            assert_eq!(template_labels.get(key), Some(value), "label {key}");
        }
    }

    #[test]
    fn single_idle_main_container_and_no_node_constraints() {
        let images = ImageSet::parse("a=img1;b=img2");
        let ds = WorkloadBuilder::new("registry/idle:1").build("ns", "cacher", &images, None);
        let pod = ds.spec.and_then(|s| s.template.spec).expect("pod spec");

        assert_eq!(pod.containers.len(), 1);
        assert_eq!(pod.containers[0].name, IDLE_CONTAINER_NAME);
        assert_eq!(pod.containers[0].image.as_deref(), Some("registry/idle:1"));
        assert!(pod.node_selector.is_none());
        assert!(pod.affinity.is_none());
        assert_eq!(pod.termination_grace_period_seconds, Some(1));

        for init in pod.init_containers.expect("init containers") {
            let command = init.command.expect("command");
            assert_eq!(command[0], "/bin/sh");
        }
    }

    #[test]
    fn metadata_carries_name_namespace_and_identity() {
        let images = ImageSet::parse("a=img1");
        let ds = WorkloadBuilder::default().build("cache-ns", "cacher", &images, Some("alice"));

        assert_eq!(ds.metadata.name.as_deref(), Some("cacher"));
        assert_eq!(ds.metadata.namespace.as_deref(), Some("cache-ns"));
        let annotations = ds.metadata.annotations.expect("annotations");
        assert_eq!(
            annotations.get(IDENTITY_ANNOTATION).map(String::as_str),
            Some("alice")
        );
        let labels = ds.metadata.labels.expect("labels");
        assert_eq!(
            labels.get(MANAGED_BY_LABEL).map(String::as_str),
            Some(MANAGED_BY)
        );
    }
}
