//! Common utilities for Kubernetes resource generation
//!
//! Label keys, annotation keys and small builders shared by the lifecycle,
//! replica and availability modules.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::EnvVar;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};

/// Operator name used as `app.kubernetes.io/managed-by` and field manager
pub const APP_NAME: &str = "kubeblocks";

pub const APP_INSTANCE_LABEL_KEY: &str = "app.kubernetes.io/instance";
pub const APP_MANAGED_BY_LABEL_KEY: &str = "app.kubernetes.io/managed-by";
pub const APP_COMPONENT_LABEL_KEY: &str = "apps.kubeblocks.io/component-name";

/// Set on a Component while it is being scaled in; the value is passed through
pub const COMPONENT_SCALE_IN_ANNOTATION_KEY: &str = "apps.kubeblocks.io/component-scale-in";

/// Finalizer guarding pre-terminate execution
pub const FINALIZER: &str = "component.kubeblocks.io/finalizer";

/// `reportingController` of the Events emitted by kbagent
pub const KBAGENT_REPORTING_CONTROLLER: &str = "kbagent";

/// `involvedObject.fieldPath` of the Events emitted by kbagent
pub const KBAGENT_FIELD_PATH: &str = "spec.containers{kbagent}";

pub const KBAGENT_CONTAINER_NAME: &str = "kbagent";

/// Labels shared by every object that belongs to a component
pub fn component_labels(cluster_name: &str, comp_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            APP_INSTANCE_LABEL_KEY.to_string(),
            cluster_name.to_string(),
        ),
        (APP_COMPONENT_LABEL_KEY.to_string(), comp_name.to_string()),
        (APP_MANAGED_BY_LABEL_KEY.to_string(), APP_NAME.to_string()),
    ])
}

/// Labels selecting the pods of a component
pub fn component_pod_selector(cluster_name: &str, comp_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            APP_INSTANCE_LABEL_KEY.to_string(),
            cluster_name.to_string(),
        ),
        (APP_COMPONENT_LABEL_KEY.to_string(), comp_name.to_string()),
    ])
}

/// Labels selecting every component of a cluster
pub fn cluster_selector(cluster_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(
        APP_INSTANCE_LABEL_KEY.to_string(),
        cluster_name.to_string(),
    )])
}

/// Build a controller OwnerReference for any kube-rs `Resource`
pub fn controller_owner_ref<K: Resource<DynamicType = ()>>(obj: &K) -> OwnerReference {
    OwnerReference {
        api_version: K::api_version(&()).to_string(),
        kind: K::kind(&()).to_string(),
        name: obj.name_any(),
        uid: obj.meta().uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Replace any existing controller reference of `obj` with `owner`
pub fn set_controller_reference<O, K>(owner: &O, obj: &mut K)
where
    O: Resource<DynamicType = ()>,
    K: Resource,
{
    let owner_ref = controller_owner_ref(owner);
    let refs = obj.meta_mut().owner_references.get_or_insert_with(Vec::new);
    refs.retain(|r| r.controller != Some(true));
    refs.push(owner_ref);
}

/// Shorthand for a plain-value `EnvVar`
pub fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.into(),
        value: Some(value.into()),
        ..Default::default()
    }
}
