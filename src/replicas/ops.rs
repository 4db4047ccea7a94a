//! Replica bookkeeping around scale-in, scale-out and pod observation

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::{debug, info};

use super::status::{
    REPLICAS_STATUS_ANNOTATION_KEY, ReplicasStatus, build_replicas_status,
    delete_replicas_status, get_replicas_status, get_replicas_status_fn, new_replicas_status,
    status_replicas_status, update_replicas_status_fn,
};
use super::task::new_replica_task;
use crate::component::generate_pod_names;
use crate::controller::error::Result;
use crate::crd::{ComponentLifecycleActions, InstanceSet};

/// Forget scaled-in replicas.
///
/// Returns the removed replicas that had joined the membership and so still
/// need to leave it.
pub fn scale_in(its: &mut InstanceSet, replicas: &[String]) -> Result<Vec<String>> {
    let mut joined = Vec::new();
    delete_replicas_status(its, replicas, |status| {
        if status.provisioned && status.member_joined.unwrap_or(true) {
            joined.push(status.name.clone());
        }
    })?;
    if !joined.is_empty() {
        info!(its = %its.name_any(), replicas = ?joined, "scaled-in replicas need to leave");
    }
    Ok(joined)
}

/// Track scaled-out replicas.
///
/// When the component loads data into new replicas and a `source` pod is
/// given, returns the env parameters of the new-replica task covering the
/// new replicas and those still waiting for their data.
pub fn scale_out(
    its: &mut InstanceSet,
    replicas: &[String],
    has_member_join: bool,
    has_data_action: bool,
    source: Option<&Pod>,
) -> Result<Option<BTreeMap<String, String>>> {
    let mut parameters = None;
    if has_data_action {
        if let Some(source) = source {
            let provisioning = get_replicas_status_fn(its, |s| s.data_loaded == Some(false))?;
            let targets: Vec<String> = replicas
                .iter()
                .chain(provisioning.iter())
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let uid = its.metadata.generation.unwrap_or_default().to_string();
            parameters = Some(new_replica_task(&its.name_any(), &uid, source, &targets)?);
            debug!(source = %source.name_any(), replicas = ?targets, "new replica task built");
        }
    }
    new_replicas_status(its, replicas, has_member_join, has_data_action)?;
    Ok(parameters)
}

/// Lifecycle actions that shape how new replicas are tracked
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplicaActions {
    pub member_join: bool,
    pub data_load: bool,
}

impl ReplicaActions {
    pub fn from_lifecycle(actions: &ComponentLifecycleActions) -> Self {
        Self {
            member_join: actions.member_join.is_some(),
            data_load: actions.data_load.is_some(),
        }
    }
}

/// Carry the tracked replicas from `running` to `proto` and bring them in line
/// with the desired replica set.
///
/// Tracked replicas outside the desired set go through [`scale_in`]. Desired
/// replicas beyond the count recorded at the last sync go through
/// [`scale_out`], with a running and loaded pod as the data source. Desired
/// replicas whose pods exist are then marked provisioned.
///
/// Returns the env parameters of the new-replica task when one was built.
pub fn sync_replicas_status(
    running: &InstanceSet,
    proto: &mut InstanceSet,
    pods: &[Pod],
    actions: ReplicaActions,
) -> Result<Option<BTreeMap<String, String>>> {
    build_replicas_status(running, proto);
    let full_name = proto.name_any();
    let desired = generate_pod_names(&full_name, proto.spec.replicas);
    let existing: BTreeSet<String> = pods.iter().map(|p| p.name_any()).collect();

    // nothing recorded yet: pods created at initial provisioning need no scale-out
    let recorded = proto
        .annotations()
        .contains_key(REPLICAS_STATUS_ANNOTATION_KEY)
        .then(|| get_replicas_status(proto))
        .transpose()?;

    let mut parameters = None;
    let mut deferred = BTreeSet::new();
    let mut recorded_replicas = None;
    if let Some(recorded) = recorded {
        recorded_replicas = Some(recorded.replicas);
        let tracked: BTreeSet<&str> = recorded.status.iter().map(|s| s.name.as_str()).collect();
        let removed: Vec<String> = tracked
            .iter()
            .filter(|name| !desired.iter().any(|d| d.as_str() == **name))
            .map(|name| name.to_string())
            .collect();
        let previous: BTreeSet<String> = generate_pod_names(&full_name, recorded.replicas)
            .into_iter()
            .collect();
        let added: Vec<String> = desired
            .iter()
            .filter(|name| !tracked.contains(name.as_str()) && !previous.contains(*name))
            .cloned()
            .collect();

        if !removed.is_empty() {
            scale_in(proto, &removed)?;
        }
        if !added.is_empty() {
            let source = data_source(&recorded, pods, &desired);
            if actions.data_load && source.is_none() {
                debug!(its = %full_name, replicas = ?added, "no data source yet, scale-out deferred");
                deferred.extend(added);
            } else {
                info!(its = %full_name, replicas = ?added, "replicas scaled out");
                parameters =
                    scale_out(proto, &added, actions.member_join, actions.data_load, source)?;
            }
        }
    }

    let observed: Vec<String> = desired
        .into_iter()
        .filter(|name| existing.contains(name) && !deferred.contains(name))
        .collect();
    status_replicas_status(proto, &observed)?;
    if let Some(replicas) = recorded_replicas.filter(|_| !deferred.is_empty()) {
        // keep the old count so that the deferred replicas are picked up again
        update_replicas_status_fn(proto, |status| {
            status.replicas = replicas;
            Ok(())
        })?;
    }
    Ok(parameters)
}

/// First running pod among the desired, provisioned replicas holding their data
fn data_source<'a>(
    recorded: &ReplicasStatus,
    pods: &'a [Pod],
    desired: &[String],
) -> Option<&'a Pod> {
    pods.iter().find(|pod| {
        let name = pod.name_any();
        let running = pod
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .is_some_and(|phase| phase == "Running");
        running
            && desired.contains(&name)
            && recorded.find(&name).is_some_and(|s| {
                s.provisioned && s.data_loaded != Some(false) && s.deletion_timestamp.is_none()
            })
    })
}
