//! Per-replica provisioning state kept in an InstanceSet annotation
//!
//! The annotation always holds the whole [`ReplicasStatus`] document; every
//! change decodes it, applies a closure and encodes it back.

use std::collections::BTreeSet;

use jiff::Timestamp;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};

use crate::controller::error::Result;
use crate::crd::InstanceSet;

pub const REPLICAS_STATUS_ANNOTATION_KEY: &str = "apps.kubeblocks.io/replicas-status";

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplicasStatus {
    /// Desired replica count of the InstanceSet when last written
    #[serde(default)]
    pub replicas: i32,

    #[serde(default)]
    pub status: Vec<ReplicaStatus>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaStatus {
    pub name: String,

    #[serde(default)]
    pub generation: String,

    pub creation_timestamp: Timestamp,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<Timestamp>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// The pod exists and has been observed running
    #[serde(default)]
    pub provisioned: bool,

    /// `None` when the replica needs no data loading
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_loaded: Option<bool>,

    /// `None` when the replica needs no member join
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_joined: Option<bool>,
}

impl ReplicaStatus {
    fn new(name: &str, generation: &str) -> Self {
        Self {
            name: name.to_string(),
            generation: generation.to_string(),
            creation_timestamp: Timestamp::now(),
            deletion_timestamp: None,
            message: None,
            provisioned: false,
            data_loaded: None,
            member_joined: None,
        }
    }
}

impl ReplicasStatus {
    pub fn find(&self, name: &str) -> Option<&ReplicaStatus> {
        self.status.iter().find(|s| s.name == name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut ReplicaStatus> {
        self.status.iter_mut().find(|s| s.name == name)
    }
}

fn its_replicas(its: &InstanceSet) -> i32 {
    its.spec.replicas
}

fn its_generation(its: &InstanceSet) -> String {
    its.metadata.generation.unwrap_or_default().to_string()
}

/// Decode the annotation; absent means nothing tracked yet
pub fn get_replicas_status(its: &InstanceSet) -> Result<ReplicasStatus> {
    match its.annotations().get(REPLICAS_STATUS_ANNOTATION_KEY) {
        Some(raw) => Ok(serde_json::from_str(raw)?),
        None => Ok(ReplicasStatus::default()),
    }
}

/// Names of the tracked replicas matching `filter`
pub fn get_replicas_status_fn(
    its: &InstanceSet,
    filter: impl Fn(&ReplicaStatus) -> bool,
) -> Result<Vec<String>> {
    Ok(get_replicas_status(its)?
        .status
        .iter()
        .filter(|s| filter(s))
        .map(|s| s.name.clone())
        .collect())
}

/// Read-modify-write of the whole annotation
pub fn update_replicas_status_fn(
    its: &mut InstanceSet,
    f: impl FnOnce(&mut ReplicasStatus) -> Result<()>,
) -> Result<()> {
    let mut status = get_replicas_status(its)?;
    f(&mut status)?;
    let raw = serde_json::to_string(&status)?;
    its.annotations_mut()
        .insert(REPLICAS_STATUS_ANNOTATION_KEY.to_string(), raw);
    Ok(())
}

/// Track replicas added by a scale-out; names already tracked are left alone
pub fn new_replicas_status(
    its: &mut InstanceSet,
    replicas: &[String],
    has_member_join: bool,
    has_data_action: bool,
) -> Result<()> {
    let generation = its_generation(its);
    let desired = its_replicas(its);
    update_replicas_status_fn(its, |status| {
        for name in replicas {
            if status.find(name).is_some() {
                continue;
            }
            let mut replica = ReplicaStatus::new(name, &generation);
            replica.data_loaded = has_data_action.then_some(false);
            replica.member_joined = has_member_join.then_some(false);
            status.status.push(replica);
        }
        status.replicas = desired;
        Ok(())
    })
}

/// Forget replicas removed by a scale-in, handing each removed entry to
/// `on_remove` first
pub fn delete_replicas_status(
    its: &mut InstanceSet,
    replicas: &[String],
    mut on_remove: impl FnMut(&ReplicaStatus),
) -> Result<()> {
    let desired = its_replicas(its);
    let removed: BTreeSet<&str> = replicas.iter().map(String::as_str).collect();
    update_replicas_status_fn(its, |status| {
        status.status.retain(|s| {
            if removed.contains(s.name.as_str()) {
                on_remove(s);
                false
            } else {
                true
            }
        });
        status.replicas = desired;
        Ok(())
    })
}

/// Reconcile the tracked set with the replicas whose pods exist.
///
/// Existing pods are marked provisioned; pods not tracked yet (e.g. created at
/// initial provisioning) are added as provisioned with nothing pending.
pub fn status_replicas_status(its: &mut InstanceSet, replicas: &[String]) -> Result<()> {
    let generation = its_generation(its);
    let desired = its_replicas(its);
    update_replicas_status_fn(its, |status| {
        for name in replicas {
            match status.find_mut(name) {
                Some(replica) => replica.provisioned = true,
                None => {
                    let mut replica = ReplicaStatus::new(name, &generation);
                    replica.provisioned = true;
                    status.status.push(replica);
                }
            }
        }
        status.replicas = desired;
        Ok(())
    })
}

/// Carry the annotation from the running object over to the desired one
pub fn build_replicas_status(running: &InstanceSet, proto: &mut InstanceSet) {
    if let Some(raw) = running.annotations().get(REPLICAS_STATUS_ANNOTATION_KEY) {
        proto
            .annotations_mut()
            .insert(REPLICAS_STATUS_ANNOTATION_KEY.to_string(), raw.clone());
    }
}
