use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::lifecycle::ReplicaRole;

/// InstanceSet is the StatefulSet-like workload backing a Component.
///
/// It shares the component's full name. Per-replica provisioning progress is
/// kept in the `apps.kubeblocks.io/replicas-status` annotation, see
/// [`crate::replicas`].
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "workloads.kubeblocks.io",
    version = "v1alpha1",
    kind = "InstanceSet",
    plural = "instancesets",
    shortname = "its",
    namespaced,
    status = "InstanceSetStatus",
    printcolumn = r#"{"name":"Replicas", "type":"integer", "jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Ready", "type":"integer", "jsonPath":".status.readyReplicas"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSetSpec {
    #[serde(default)]
    pub replicas: i32,

    /// Labels selecting the pods of this set
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selector: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<ReplicaRole>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSetStatus {
    #[serde(default)]
    pub replicas: i32,

    #[serde(default)]
    pub ready_replicas: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
