use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::PodSpec;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::available::ComponentAvailable;
use super::lifecycle::{ComponentLifecycleActions, ComponentTemplateSpec, ReplicaRole};

/// Component is one workload group of a Cluster, named `<cluster>-<component>`
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "apps.kubeblocks.io",
    version = "v1alpha1",
    kind = "Component",
    plural = "components",
    shortname = "cmp",
    namespaced,
    status = "ComponentStatus",
    printcolumn = r#"{"name":"Definition", "type":"string", "jsonPath":".spec.compDef"}"#,
    printcolumn = r#"{"name":"Replicas", "type":"integer", "jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    /// Name of the ComponentDefinition this component was resolved from
    #[serde(default)]
    pub comp_def: String,

    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Pod template the workload is rendered from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_spec: Option<PodSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle_actions: Option<ComponentLifecycleActions>,

    /// Script templates; their volumes are mounted into action Jobs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scripts: Vec<ComponentTemplateSpec>,

    /// Configuration file templates
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub configs: Vec<ComponentTemplateSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<ReplicaRole>,

    /// Names of the system accounts provisioned for the component
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub system_accounts: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<ComponentAvailable>,
}

fn default_replicas() -> i32 {
    1
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    #[serde(default)]
    pub phase: ComponentPhase,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Free-form messages keyed by topic
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub message: BTreeMap<String, String>,
}

/// Component lifecycle phase
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq, Eq)]
pub enum ComponentPhase {
    #[default]
    Creating,
    Running,
    Updating,
    Stopping,
    Stopped,
    Deleting,
    Failed,
    Abnormal,
}

impl std::fmt::Display for ComponentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentPhase::Creating => write!(f, "Creating"),
            ComponentPhase::Running => write!(f, "Running"),
            ComponentPhase::Updating => write!(f, "Updating"),
            ComponentPhase::Stopping => write!(f, "Stopping"),
            ComponentPhase::Stopped => write!(f, "Stopped"),
            ComponentPhase::Deleting => write!(f, "Deleting"),
            ComponentPhase::Failed => write!(f, "Failed"),
            ComponentPhase::Abnormal => write!(f, "Abnormal"),
        }
    }
}

/// Kubernetes-style condition
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition: True, False, or Unknown
    pub status: String,

    /// Reason for the condition's last transition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    pub last_transition_time: String,

    /// Generation observed when condition was set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Component {
    pub fn phase(&self) -> Option<&ComponentPhase> {
        self.status.as_ref().map(|s| &s.phase)
    }
}
