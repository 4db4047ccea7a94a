//! Job builder for one-shot lifecycle action runners

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, PodSpec, PodTemplateSpec, ResourceRequirements, Toleration, Volume,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::ObjectMeta;

/// Default number of retries for an action Job
pub const DEFAULT_BACKOFF_LIMIT: i32 = 2;

/// Seconds a finished Job lingers once cleanup has been requested
pub const CLEANUP_TTL_SECONDS: i32 = 5;

/// Builder for batch/v1 `Job` resources that run a single action container.
///
/// Pods never restart in place; retries are left to the Job backoff limit.
///
/// ```ignore
/// let job = ActionJobBuilder::new("kb-post-provision-job-mycluster-mysql", "default")
///     .labels(labels)
///     .container(container)
///     .build();
/// ```
pub struct ActionJobBuilder {
    name: String,
    namespace: String,
    labels: BTreeMap<String, String>,
    containers: Vec<Container>,
    volumes: Vec<Volume>,
    tolerations: Vec<Toleration>,
    backoff_limit: i32,
}

impl ActionJobBuilder {
    pub fn new(name: &str, namespace: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            labels: BTreeMap::new(),
            containers: vec![],
            volumes: vec![],
            tolerations: vec![],
            backoff_limit: DEFAULT_BACKOFF_LIMIT,
        }
    }

    pub fn labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn container(mut self, container: Container) -> Self {
        self.containers.push(container);
        self
    }

    pub fn volumes(mut self, volumes: Vec<Volume>) -> Self {
        self.volumes = volumes;
        self
    }

    pub fn tolerations(mut self, tolerations: Vec<Toleration>) -> Self {
        self.tolerations.extend(tolerations);
        self
    }

    /// Override the backoff limit; values <= 0 keep the default
    pub fn max_retries(mut self, max_retries: i32) -> Self {
        if max_retries > 0 {
            self.backoff_limit = max_retries;
        }
        self
    }

    pub fn build(self) -> Job {
        let mut containers = self.containers;
        containers.iter_mut().for_each(inject_zero_resource_limits);

        Job {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(self.labels),
                ..Default::default()
            },
            spec: Some(JobSpec {
                backoff_limit: Some(self.backoff_limit),
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        name: Some(self.name),
                        namespace: Some(self.namespace),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        restart_policy: Some("Never".to_string()),
                        containers,
                        volumes: (!self.volumes.is_empty()).then_some(self.volumes),
                        tolerations: (!self.tolerations.is_empty()).then_some(self.tolerations),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// Set zero cpu/memory limits on a container that declares none, so a
/// namespace LimitRange default cannot apply to it.
pub fn inject_zero_resource_limits(container: &mut Container) {
    let resources = container
        .resources
        .get_or_insert_with(ResourceRequirements::default);
    if resources.limits.as_ref().is_some_and(|l| !l.is_empty()) {
        return;
    }
    resources.limits = Some(BTreeMap::from([
        ("cpu".to_string(), Quantity("0".to_string())),
        ("memory".to_string(), Quantity("0".to_string())),
    ]));
}
