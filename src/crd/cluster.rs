use k8s_openapi::api::core::v1::Toleration;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Cluster groups the components of one database deployment
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "apps.kubeblocks.io",
    version = "v1alpha1",
    kind = "Cluster",
    plural = "clusters",
    shortname = "cl",
    namespaced,
    status = "ClusterStatus",
    printcolumn = r#"{"name":"Definition", "type":"string", "jsonPath":".spec.clusterDefinitionRef"}"#,
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_definition_ref: Option<String>,

    /// Component specs; `None` when the cluster declares no components at all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_specs: Option<Vec<ClusterComponentSpec>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sharding_specs: Option<Vec<ShardingSpec>>,

    /// Tolerations copied onto lifecycle action Jobs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,
}

impl ClusterSpec {
    /// True when the cluster declares component or sharding specs
    pub fn has_topology(&self) -> bool {
        self.component_specs.is_some() || self.sharding_specs.is_some()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterComponentSpec {
    pub name: String,

    #[serde(default)]
    pub component_def: String,

    #[serde(default = "default_replicas")]
    pub replicas: i32,
}

fn default_replicas() -> i32 {
    1
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShardingSpec {
    pub name: String,

    pub template: ClusterComponentSpec,

    #[serde(default)]
    pub shards: i32,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    #[serde(default)]
    pub phase: ClusterPhase,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Cluster lifecycle phase
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq, Eq)]
pub enum ClusterPhase {
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

impl std::fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterPhase::Creating => write!(f, "Creating"),
            ClusterPhase::Running => write!(f, "Running"),
            ClusterPhase::Updating => write!(f, "Updating"),
            ClusterPhase::Stopping => write!(f, "Stopping"),
            ClusterPhase::Stopped => write!(f, "Stopped"),
            ClusterPhase::Deleting => write!(f, "Deleting"),
            ClusterPhase::Failed => write!(f, "Failed"),
            ClusterPhase::Abnormal => write!(f, "Abnormal"),
        }
    }
}

impl Cluster {
    pub fn phase(&self) -> Option<&ClusterPhase> {
        self.status.as_ref().map(|s| &s.phase)
    }
}
