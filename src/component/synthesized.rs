use k8s_openapi::api::core::v1::PodSpec;
use kube::ResourceExt;

use super::short_name;
use crate::controller::error::{Error, Result};
use crate::crd::{
    Cluster, Component, ComponentAvailable, ComponentLifecycleActions, ComponentTemplateSpec,
    ReplicaRole,
};

/// Flattened, read-only view of a component's desired state for one
/// reconcile pass.
#[derive(Clone, Debug, Default)]
pub struct SynthesizedComponent {
    pub namespace: String,
    pub cluster_name: String,
    pub cluster_uid: String,
    /// Short name, unique within the cluster
    pub name: String,
    /// `<cluster>-<name>`, the Component object name
    pub full_comp_name: String,
    pub comp_def_name: String,
    /// Component generation, as a string
    pub generation: String,
    pub replicas: i32,
    pub pod_spec: PodSpec,
    pub lifecycle_actions: ComponentLifecycleActions,
    pub script_templates: Vec<ComponentTemplateSpec>,
    pub config_templates: Vec<ComponentTemplateSpec>,
    pub roles: Vec<ReplicaRole>,
    pub system_accounts: Vec<String>,
    pub available: Option<ComponentAvailable>,
}

impl SynthesizedComponent {
    pub fn build(cluster: &Cluster, comp: &Component) -> Result<Self> {
        let namespace = comp
            .namespace()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        let cluster_name = cluster.name_any();
        let full_comp_name = comp.name_any();
        let name = short_name(&cluster_name, &full_comp_name)?;

        Ok(Self {
            namespace,
            cluster_uid: cluster.uid().unwrap_or_default(),
            name,
            comp_def_name: comp.spec.comp_def.clone(),
            generation: comp.metadata.generation.unwrap_or_default().to_string(),
            replicas: comp.spec.replicas,
            pod_spec: comp.spec.pod_spec.clone().unwrap_or_default(),
            lifecycle_actions: comp.spec.lifecycle_actions.clone().unwrap_or_default(),
            script_templates: comp.spec.scripts.clone(),
            config_templates: comp.spec.configs.clone(),
            roles: comp.spec.roles.clone(),
            system_accounts: comp.spec.system_accounts.clone(),
            available: comp.spec.available.clone(),
            cluster_name,
            full_comp_name,
        })
    }
}
