//! Rendering of the Job that executes a lifecycle action
//!
//! The Job is shaped after a live pod of the component (the first one
//! listed): its script volumes and their mounts are reused, and the
//! environment is composed from the action, the pod template and the
//! topology of the cluster.

use std::collections::BTreeSet;

use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{
    Container, EnvFromSource, EnvVar, Pod, Toleration, Volume, VolumeMount,
};
use kube::ResourceExt;
use tracing::debug;

use super::action::LifecycleActionType;
use super::resolver::check_lifecycle_action;
use crate::client::Reader;
use crate::component::{
    SynthesizedComponent, is_deleting, list_cluster_components, list_component_pods, short_name,
};
use crate::controller::error::{Error, Result};
use crate::crd::{Cluster, Component, ComponentTemplateSpec};
use crate::resources::common::{COMPONENT_SCALE_IN_ANNOTATION_KEY, env};
use crate::resources::job::ActionJobBuilder;

pub const ACTION_CONTAINER_NAME: &str = "kb-lifecycle-action-job";

pub const CLUSTER_POD_NAME_LIST: &str = "KB_CLUSTER_POD_NAME_LIST";
pub const CLUSTER_POD_IP_LIST: &str = "KB_CLUSTER_POD_IP_LIST";
pub const CLUSTER_POD_HOST_NAME_LIST: &str = "KB_CLUSTER_POD_HOST_NAME_LIST";
pub const CLUSTER_POD_HOST_IP_LIST: &str = "KB_CLUSTER_POD_HOST_IP_LIST";

pub const COMPONENT_POD_NAME_LIST: &str = "KB_CLUSTER_COMPONENT_POD_NAME_LIST";
pub const COMPONENT_POD_IP_LIST: &str = "KB_CLUSTER_COMPONENT_POD_IP_LIST";
pub const COMPONENT_POD_HOST_NAME_LIST: &str = "KB_CLUSTER_COMPONENT_POD_HOST_NAME_LIST";
pub const COMPONENT_POD_HOST_IP_LIST: &str = "KB_CLUSTER_COMPONENT_POD_HOST_IP_LIST";

pub const COMPONENT_IS_SCALING_IN: &str = "KB_CLUSTER_COMPONENT_IS_SCALING_IN";
pub const COMPONENT_LIST: &str = "KB_CLUSTER_COMPONENT_LIST";
pub const COMPONENT_DELETING_LIST: &str = "KB_CLUSTER_COMPONENT_DELETING_LIST";
pub const COMPONENT_UNDELETED_LIST: &str = "KB_CLUSTER_COMPONENT_UNDELETED_LIST";

/// Inputs of one rendering
pub struct ActionContext<'a> {
    pub cluster: &'a Cluster,
    pub synth: &'a SynthesizedComponent,
    pub action_type: LifecycleActionType,
    /// Appended after the cluster tolerations
    pub data_plane_tolerations: &'a [Toleration],
}

/// Build the (unsubmitted) Job running the action
pub async fn render_action_job<R: Reader>(reader: &R, ctx: &ActionContext<'_>) -> Result<Job> {
    let action_type = ctx.action_type;
    let synth = ctx.synth;
    let action = check_lifecycle_action(synth, action_type)
        .ok_or_else(|| Error::ActionNotDefined(action_type.to_string()))?;
    let exec = action.exec.as_ref().ok_or_else(|| {
        Error::UnsupportedAction(format!(
            "lifecycle action {action_type} custom handler only support exec command by now, please check your customHandler spec"
        ))
    })?;
    let job_name = action_type.job_name(&synth.full_comp_name)?;
    let labels = action_type.job_labels(&synth.cluster_name, &synth.name)?;

    let pods =
        list_component_pods(reader, &synth.namespace, &synth.cluster_name, &synth.name).await?;
    let Some(tpl_pod) = pods.first() else {
        return Err(Error::NotFound("component pods not found".to_string()));
    };

    let (volumes, volume_mounts) = job_volumes(tpl_pod, &synth.script_templates);

    let tpl_container = tpl_pod.spec.as_ref().and_then(|s| s.containers.first());
    let tpl_env = tpl_container
        .and_then(|c| c.env.clone())
        .unwrap_or_default();
    let env_from: Vec<EnvFromSource> = tpl_container
        .and_then(|c| c.env_from.clone())
        .unwrap_or_default();

    let mut generated = Vec::new();
    if ctx.cluster.spec.has_topology() {
        let comps = list_cluster_components(reader, ctx.cluster).await?;
        generated.extend(component_pod_envs(&pods));
        generated.extend(component_envs(&synth.full_comp_name, &comps));
        generated.extend(cluster_envs(reader, ctx.cluster, &comps).await?);
    }
    let envs = merge_envs(action.env.iter().cloned().chain(tpl_env).chain(generated));

    let container = Container {
        name: ACTION_CONTAINER_NAME.to_string(),
        image: action.image.clone(),
        image_pull_policy: Some("IfNotPresent".to_string()),
        command: (!exec.command.is_empty()).then(|| exec.command.clone()),
        args: (!exec.args.is_empty()).then(|| exec.args.clone()),
        env: (!envs.is_empty()).then_some(envs),
        env_from: (!env_from.is_empty()).then_some(env_from),
        volume_mounts: (!volume_mounts.is_empty()).then_some(volume_mounts),
        ..Default::default()
    };

    let max_retries = action
        .retry_policy
        .as_ref()
        .map(|p| p.max_retries)
        .unwrap_or_default();

    debug!(job = %job_name, action = %action_type, pod = %tpl_pod.name_any(), "rendered action job");

    Ok(ActionJobBuilder::new(&job_name, &synth.namespace)
        .labels(labels)
        .container(container)
        .volumes(volumes)
        .tolerations(ctx.cluster.spec.tolerations.clone())
        .tolerations(ctx.data_plane_tolerations.to_vec())
        .max_retries(max_retries)
        .build())
}

/// Volumes of `pod` backing the script templates, and their mounts.
///
/// For each selected volume every container contributes its first mount of it.
pub fn job_volumes(
    pod: &Pod,
    script_templates: &[ComponentTemplateSpec],
) -> (Vec<Volume>, Vec<VolumeMount>) {
    let Some(spec) = pod.spec.as_ref() else {
        return (vec![], vec![]);
    };
    let pod_volumes = spec.volumes.as_deref().unwrap_or_default();

    let volumes: Vec<Volume> = script_templates
        .iter()
        .filter_map(|tpl| pod_volumes.iter().find(|v| v.name == tpl.volume_name))
        .cloned()
        .collect();

    let mounts = volumes
        .iter()
        .flat_map(|volume| {
            spec.containers.iter().filter_map(move |c| {
                c.volume_mounts
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .find(|m| m.name == volume.name)
                    .cloned()
            })
        })
        .collect();

    (volumes, mounts)
}

struct PodLists {
    names: Vec<String>,
    ips: Vec<String>,
    host_names: Vec<String>,
    host_ips: Vec<String>,
}

impl PodLists {
    fn collect<'a>(pods: impl IntoIterator<Item = &'a Pod>) -> Self {
        let mut lists = PodLists {
            names: vec![],
            ips: vec![],
            host_names: vec![],
            host_ips: vec![],
        };
        for pod in pods {
            let status = pod.status.as_ref();
            lists.names.push(pod.name_any());
            lists
                .ips
                .push(status.and_then(|s| s.pod_ip.clone()).unwrap_or_default());
            lists.host_names.push(
                pod.spec
                    .as_ref()
                    .and_then(|s| s.node_name.clone())
                    .unwrap_or_default(),
            );
            lists
                .host_ips
                .push(status.and_then(|s| s.host_ip.clone()).unwrap_or_default());
        }
        lists
    }

    fn envs(&self, keys: [&str; 4]) -> Vec<EnvVar> {
        vec![
            env(keys[0], self.names.join(",")),
            env(keys[1], self.ips.join(",")),
            env(keys[2], self.host_names.join(",")),
            env(keys[3], self.host_ips.join(",")),
        ]
    }
}

/// Name, IP, node name and host IP lists of the component pods
pub fn component_pod_envs(pods: &[Pod]) -> Vec<EnvVar> {
    PodLists::collect(pods).envs([
        COMPONENT_POD_NAME_LIST,
        COMPONENT_POD_IP_LIST,
        COMPONENT_POD_HOST_NAME_LIST,
        COMPONENT_POD_HOST_IP_LIST,
    ])
}

/// Scale-in flag, present only while the component carries the annotation
pub fn component_envs(full_comp_name: &str, comps: &[Component]) -> Vec<EnvVar> {
    comps
        .iter()
        .filter(|c| c.name_any() == full_comp_name)
        .filter_map(|c| c.annotations().get(COMPONENT_SCALE_IN_ANNOTATION_KEY))
        .map(|value| env(COMPONENT_IS_SCALING_IN, value.clone()))
        .collect()
}

/// Component lists and pod lists across the whole cluster.
///
/// Components without pods are left out of every list.
pub async fn cluster_envs<R: Reader>(
    reader: &R,
    cluster: &Cluster,
    comps: &[Component],
) -> Result<Vec<EnvVar>> {
    let namespace = cluster.namespace().unwrap_or_default();
    let cluster_name = cluster.name_any();
    let mut cluster_pods = Vec::new();
    let mut names = Vec::new();
    let mut deleting = Vec::new();
    let mut undeleted = Vec::new();

    for comp in comps {
        let comp_name = short_name(&cluster_name, &comp.name_any())?;
        let pods = list_component_pods(reader, &namespace, &cluster_name, &comp_name).await?;
        if pods.is_empty() {
            continue;
        }
        cluster_pods.extend(pods);
        if is_deleting(comp) {
            deleting.push(comp_name.clone());
        } else {
            undeleted.push(comp_name.clone());
        }
        names.push(comp_name);
    }

    let mut envs = vec![
        env(COMPONENT_LIST, names.join(",")),
        env(COMPONENT_DELETING_LIST, deleting.join(",")),
        env(COMPONENT_UNDELETED_LIST, undeleted.join(",")),
    ];
    envs.extend(PodLists::collect(&cluster_pods).envs([
        CLUSTER_POD_NAME_LIST,
        CLUSTER_POD_IP_LIST,
        CLUSTER_POD_HOST_NAME_LIST,
        CLUSTER_POD_HOST_IP_LIST,
    ]));
    Ok(envs)
}

/// Drop later duplicates of an env name; the first definition wins
pub fn merge_envs(envs: impl IntoIterator<Item = EnvVar>) -> Vec<EnvVar> {
    let mut seen = BTreeSet::new();
    envs.into_iter()
        .filter(|e| {
            let fresh = seen.insert(e.name.clone());
            if !fresh {
                debug!(env = %e.name, "duplicate env dropped");
            }
            fresh
        })
        .collect()
}
