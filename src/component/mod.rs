//! Component naming, synthesis and listing helpers

mod synthesized;

pub use synthesized::SynthesizedComponent;

use k8s_openapi::api::core::v1::Pod;

use crate::client::Reader;
use crate::controller::error::{Error, Result};
use crate::crd::{Cluster, Component};
use crate::resources::common::{cluster_selector, component_pod_selector};
use kube::ResourceExt;

/// Name of the Component object for a component of `cluster`
pub fn full_name(cluster_name: &str, short_name: &str) -> String {
    format!("{cluster_name}-{short_name}")
}

/// Strip the cluster prefix from a Component name
pub fn short_name(cluster_name: &str, full_name: &str) -> Result<String> {
    full_name
        .strip_prefix(cluster_name)
        .and_then(|rest| rest.strip_prefix('-'))
        .filter(|rest| !rest.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            Error::InvalidConfig(format!(
                "component name {full_name} does not belong to cluster {cluster_name}"
            ))
        })
}

/// Pod names of a component with `replicas` instances
pub fn generate_pod_names(full_comp_name: &str, replicas: i32) -> Vec<String> {
    (0..replicas.max(0))
        .map(|i| format!("{full_comp_name}-{i}"))
        .collect()
}

/// Stable DNS name of a component pod behind the headless service
pub fn pod_fqdn(namespace: &str, full_comp_name: &str, pod_name: &str) -> String {
    format!("{pod_name}.{full_comp_name}-headless.{namespace}.svc")
}

/// Pods of one component, in list order
pub async fn list_component_pods<R: Reader>(
    reader: &R,
    namespace: &str,
    cluster_name: &str,
    comp_name: &str,
) -> Result<Vec<Pod>> {
    reader
        .list(namespace, &component_pod_selector(cluster_name, comp_name))
        .await
}

/// All Component objects of a cluster
pub async fn list_cluster_components<R: Reader>(
    reader: &R,
    cluster: &Cluster,
) -> Result<Vec<Component>> {
    let namespace = cluster.namespace().unwrap_or_default();
    reader
        .list(&namespace, &cluster_selector(&cluster.name_any()))
        .await
}

pub fn is_deleting(comp: &Component) -> bool {
    comp.metadata.deletion_timestamp.is_some()
}
