//! Test fixtures and builders for Cluster, Component and their workloads
//!
//! # Quick Start
//!
//! ```rust,ignore
//! let cluster = create_test_cluster("mycluster", "default");
//! let comp = ComponentBuilder::new("mycluster", "mysql", "default")
//!     .with_phase(ComponentPhase::Running)
//!     .with_post_provision(exec_action(&["/scripts/init.sh"]))
//!     .build();
//! let pod = PodBuilder::new("mycluster", "mysql", 0, "default").build();
//! ```
//!
//! Objects meant to be read back by the reconcile logic go through
//! [`seed`], which stores them in a [`MemoryClient`].

use std::collections::BTreeMap;

use component_operator::client::{MemoryClient, Object};
use component_operator::component::full_name;
use component_operator::crd::{
    Action, Cluster, ClusterComponentSpec, ClusterPhase, ClusterSpec, ClusterStatus, Component,
    ComponentAvailable, ComponentLifecycleActions, ComponentPhase, ComponentSpec, ComponentStatus,
    ComponentTemplateSpec, ExecAction, InstanceSet, InstanceSetSpec, LifecycleActionHandler,
    PreConditionType, Probe,
};
use component_operator::resources::common::{
    APP_INSTANCE_LABEL_KEY, KBAGENT_FIELD_PATH, KBAGENT_REPORTING_CONTROLLER,
    component_pod_selector,
};
use chrono::Utc;
use k8s_openapi::api::batch::v1::{Job, JobCondition, JobStatus};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, EnvVar, Event, ObjectReference, Pod, PodSpec, PodStatus,
    Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::core::ObjectMeta;

pub const NAMESPACE: &str = "default";

// =============================================================================
// Convenience Functions for Simple Test Cases
// =============================================================================

/// A Running cluster declaring one component spec
pub fn create_test_cluster(name: &str, namespace: &str) -> Cluster {
    ClusterBuilder::new(name, namespace)
        .with_component("mysql", 3)
        .with_phase(ClusterPhase::Running)
        .build()
}

/// Exec action running `command` in busybox
pub fn exec_action(command: &[&str]) -> Action {
    Action {
        image: Some("busybox:1.36".to_string()),
        exec: Some(ExecAction {
            command: command.iter().map(|s| s.to_string()).collect(),
            args: vec![],
        }),
        ..Default::default()
    }
}

pub fn plain_env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

/// Store every object in a fresh [`MemoryClient`]
pub fn seed<K: Object>(client: &MemoryClient, objects: &[K]) {
    for obj in objects {
        client.insert(obj).unwrap();
    }
}

/// Mark a Job finished with the given terminal condition ("Complete" or "Failed")
pub fn finish_job(job: &mut Job, condition: &str) {
    job.status = Some(JobStatus {
        conditions: Some(vec![JobCondition {
            type_: condition.to_string(),
            status: "True".to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    });
}

// =============================================================================
// Cluster Builder
// =============================================================================

pub struct ClusterBuilder {
    name: String,
    namespace: String,
    spec: ClusterSpec,
    phase: Option<ClusterPhase>,
    annotations: BTreeMap<String, String>,
}

impl ClusterBuilder {
    pub fn new(name: &str, namespace: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            spec: ClusterSpec::default(),
            phase: None,
            annotations: BTreeMap::new(),
        }
    }

    pub fn with_component(mut self, name: &str, replicas: i32) -> Self {
        self.spec
            .component_specs
            .get_or_insert_with(Vec::new)
            .push(ClusterComponentSpec {
                name: name.to_string(),
                component_def: "apecloud-mysql".to_string(),
                replicas,
            });
        self
    }

    pub fn with_phase(mut self, phase: ClusterPhase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn with_annotation(mut self, key: &str, value: &str) -> Self {
        self.annotations.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_toleration(mut self, key: &str) -> Self {
        self.spec
            .tolerations
            .push(k8s_openapi::api::core::v1::Toleration {
                key: Some(key.to_string()),
                operator: Some("Exists".to_string()),
                ..Default::default()
            });
        self
    }

    pub fn build(self) -> Cluster {
        Cluster {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace),
                uid: Some(format!("{}-uid", self.name)),
                annotations: (!self.annotations.is_empty()).then_some(self.annotations),
                ..Default::default()
            },
            spec: self.spec,
            status: self.phase.map(|phase| ClusterStatus {
                phase,
                observed_generation: Some(1),
            }),
        }
    }
}

// =============================================================================
// Component Builder
// =============================================================================

pub struct ComponentBuilder {
    cluster_name: String,
    name: String,
    namespace: String,
    spec: ComponentSpec,
    phase: Option<ComponentPhase>,
    annotations: Option<BTreeMap<String, String>>,
    finalizers: Vec<String>,
    deleting: bool,
    generation: i64,
}

impl ComponentBuilder {
    /// Component `<cluster>-<name>`, labelled as belonging to `cluster_name`
    pub fn new(cluster_name: &str, name: &str, namespace: &str) -> Self {
        Self {
            cluster_name: cluster_name.to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
            spec: ComponentSpec {
                comp_def: "apecloud-mysql".to_string(),
                replicas: 1,
                ..Default::default()
            },
            phase: None,
            annotations: None,
            finalizers: vec![],
            deleting: false,
            generation: 1,
        }
    }

    pub fn with_replicas(mut self, replicas: i32) -> Self {
        self.spec.replicas = replicas;
        self
    }

    pub fn with_phase(mut self, phase: ComponentPhase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn with_generation(mut self, generation: i64) -> Self {
        self.generation = generation;
        self
    }

    fn actions(&mut self) -> &mut ComponentLifecycleActions {
        self.spec
            .lifecycle_actions
            .get_or_insert_with(Default::default)
    }

    pub fn with_post_provision(mut self, action: Action) -> Self {
        self.actions().post_provision = Some(LifecycleActionHandler {
            custom_handler: Some(action),
        });
        self
    }

    pub fn with_pre_terminate(mut self, action: Action) -> Self {
        self.actions().pre_terminate = Some(LifecycleActionHandler {
            custom_handler: Some(action),
        });
        self
    }

    pub fn with_data_load(mut self, action: Action) -> Self {
        self.actions().data_load = Some(LifecycleActionHandler {
            custom_handler: Some(action),
        });
        self
    }

    pub fn with_available_probe(mut self, period_seconds: i32) -> Self {
        self.actions().available_probe = Some(Probe {
            handler: LifecycleActionHandler {
                custom_handler: Some(exec_action(&["/scripts/check.sh"])),
            },
            period_seconds,
        });
        self
    }

    pub fn with_available(mut self, available: ComponentAvailable) -> Self {
        self.spec.available = Some(available);
        self
    }

    /// Script template mounted through `volume`
    pub fn with_script(mut self, volume: &str) -> Self {
        self.spec.scripts.push(ComponentTemplateSpec {
            name: format!("{volume}-template"),
            template_ref: format!("{volume}-cm"),
            volume_name: volume.to_string(),
            default_mode: Some(0o555),
        });
        self
    }

    pub fn with_annotation(mut self, key: &str, value: &str) -> Self {
        self.annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        self
    }

    /// Present but empty annotation map
    pub fn with_empty_annotations(mut self) -> Self {
        self.annotations.get_or_insert_with(BTreeMap::new);
        self
    }

    pub fn with_finalizer(mut self, finalizer: &str) -> Self {
        self.finalizers.push(finalizer.to_string());
        self
    }

    pub fn deleting(mut self) -> Self {
        self.deleting = true;
        self
    }

    pub fn build(self) -> Component {
        let full = full_name(&self.cluster_name, &self.name);
        Component {
            metadata: ObjectMeta {
                name: Some(full.clone()),
                namespace: Some(self.namespace),
                uid: Some(format!("{full}-uid")),
                generation: Some(self.generation),
                labels: Some(BTreeMap::from([(
                    APP_INSTANCE_LABEL_KEY.to_string(),
                    self.cluster_name,
                )])),
                annotations: self.annotations,
                finalizers: (!self.finalizers.is_empty()).then_some(self.finalizers),
                deletion_timestamp: self.deleting.then(|| Time(Utc::now())),
                ..Default::default()
            },
            spec: self.spec,
            status: self.phase.map(|phase| ComponentStatus {
                phase,
                ..Default::default()
            }),
        }
    }
}

// =============================================================================
// Pod Builder
// =============================================================================

pub struct PodBuilder {
    name: String,
    namespace: String,
    labels: BTreeMap<String, String>,
    ip: String,
    node: String,
    host_ip: String,
    env: Vec<EnvVar>,
    volumes: Vec<String>,
}

impl PodBuilder {
    /// Pod `<cluster>-<comp>-<index>` selected by the component pod labels
    pub fn new(cluster_name: &str, comp_name: &str, index: i32, namespace: &str) -> Self {
        Self {
            name: format!("{}-{index}", full_name(cluster_name, comp_name)),
            namespace: namespace.to_string(),
            labels: component_pod_selector(cluster_name, comp_name),
            ip: format!("10.0.0.{}", index + 1),
            node: format!("node-{index}"),
            host_ip: format!("192.168.0.{}", index + 1),
            env: vec![],
            volumes: vec![],
        }
    }

    pub fn with_env(mut self, name: &str, value: &str) -> Self {
        self.env.push(plain_env(name, value));
        self
    }

    /// ConfigMap volume mounted in the main container under /scripts/<name>
    pub fn with_volume(mut self, name: &str) -> Self {
        self.volumes.push(name.to_string());
        self
    }

    pub fn build(self) -> Pod {
        let volumes: Vec<Volume> = self
            .volumes
            .iter()
            .map(|name| Volume {
                name: name.clone(),
                config_map: Some(ConfigMapVolumeSource {
                    name: format!("{name}-cm"),
                    ..Default::default()
                }),
                ..Default::default()
            })
            .collect();
        let mounts: Vec<VolumeMount> = self
            .volumes
            .iter()
            .map(|name| VolumeMount {
                name: name.clone(),
                mount_path: format!("/scripts/{name}"),
                ..Default::default()
            })
            .collect();

        Pod {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace),
                uid: Some(format!("{}-uid", self.name)),
                labels: Some(self.labels),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: Some(self.node),
                containers: vec![Container {
                    name: "mysql".to_string(),
                    image: Some("mysql:8.0".to_string()),
                    env: (!self.env.is_empty()).then_some(self.env),
                    volume_mounts: (!mounts.is_empty()).then_some(mounts),
                    ..Default::default()
                }],
                volumes: (!volumes.is_empty()).then_some(volumes),
                ..Default::default()
            }),
            status: Some(PodStatus {
                pod_ip: Some(self.ip),
                host_ip: Some(self.host_ip),
                phase: Some("Running".to_string()),
                ..Default::default()
            }),
        }
    }
}

// =============================================================================
// Workloads and Events
// =============================================================================

pub fn create_test_instance_set(
    full_comp_name: &str,
    namespace: &str,
    replicas: i32,
    generation: i64,
) -> InstanceSet {
    let mut its = InstanceSet::new(
        full_comp_name,
        InstanceSetSpec {
            replicas,
            ..Default::default()
        },
    );
    its.metadata.namespace = Some(namespace.to_string());
    its.metadata.generation = Some(generation);
    its
}

/// Event as emitted by kbagent for the pod `pod_name`
pub fn agent_event(pod_name: &str, namespace: &str, reason: &str, message: String) -> Event {
    Event {
        metadata: ObjectMeta {
            name: Some(format!("{pod_name}.{reason}")),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        involved_object: ObjectReference {
            kind: Some("Pod".to_string()),
            name: Some(pod_name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("{pod_name}-uid")),
            field_path: Some(KBAGENT_FIELD_PATH.to_string()),
            ..Default::default()
        },
        reason: Some(reason.to_string()),
        reporting_component: Some(KBAGENT_REPORTING_CONTROLLER.to_string()),
        message: Some(message),
        last_timestamp: Some(Time(Utc::now())),
        ..Default::default()
    }
}

/// Require the precondition on an action
pub fn with_precondition(mut action: Action, precondition: PreConditionType) -> Action {
    action.pre_condition = Some(precondition);
    action
}
