//! Done markers of lifecycle actions
//!
//! Completion is recorded as an annotation on the Component, staged through
//! the DAG. The action Job may only be cleaned up once the marker is set.

use chrono::{SecondsFormat, Utc};
use k8s_openapi::api::batch::v1::Job;
use kube::ResourceExt;
use tracing::{debug, info};

use super::action::LifecycleActionType;
use super::job::clean_job_with_dag;
use crate::client::ObjectKey;
use crate::controller::error::{Error, Result};
use crate::crd::{Cluster, Component};
use crate::graph::{Dag, GraphClient};

/// Annotation set on the Cluster by releases before 0.8 once post-provision ran
pub fn legacy_done_key(full_comp_name: &str) -> String {
    format!("kubeblocks.io/{full_comp_name}-poststart-done")
}

/// Set the done marker on `comp` unless already present.
///
/// `comp` is the reconcile working copy; the change is staged as an update of
/// the Component. Returns false when the marker already existed.
pub fn set_action_done(
    graph: &GraphClient,
    dag: &mut Dag,
    comp: &mut Component,
    action_type: LifecycleActionType,
) -> Result<bool> {
    let done_key = action_type.job_spec()?.done_key;
    if comp.annotations().contains_key(done_key) {
        debug!(action = %action_type, "done marker already set");
        return Ok(false);
    }

    let orig = comp.clone();
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true);
    comp.annotations_mut().insert(done_key.to_string(), now);
    graph.update(dag, &orig, comp)?;
    info!(action = %action_type, component = %comp.name_any(), "action marked done");
    Ok(true)
}

/// Whether the action has been recorded as done.
///
/// Post-provision also honours the legacy marker on the Cluster. Missing
/// annotation maps count as empty.
pub fn check_action_done(
    cluster: &Cluster,
    comp: &Component,
    action_type: LifecycleActionType,
) -> bool {
    let Ok(spec) = action_type.job_spec() else {
        return false;
    };
    if action_type == LifecycleActionType::PostProvision
        && cluster
            .annotations()
            .contains_key(&legacy_done_key(&comp.name_any()))
    {
        return true;
    }
    comp.annotations().contains_key(spec.done_key)
}

/// Stage TTL cleanup of a finished action Job.
///
/// Refuses unless the done marker is set; the cleanup is ordered after the
/// staged Component update carrying the marker.
pub fn clean_action_job(
    graph: &GraphClient,
    dag: &mut Dag,
    cluster: &Cluster,
    comp: &Component,
    action_type: LifecycleActionType,
    job: &Job,
) -> Result<usize> {
    if !check_action_done(cluster, comp, action_type) {
        return Err(Error::PreconditionFailed(format!(
            "cluster {} {} done annotation has not been set",
            cluster.name_any(),
            action_type
        )));
    }
    let cleanup = clean_job_with_dag(graph, dag, job)?;
    let comp_key = ObjectKey::of::<Component>(&comp.namespace().unwrap_or_default(), &comp.name_any());
    if let Some(marker) = dag.index_of(&comp_key, false) {
        graph.depends_on(dag, cleanup, marker);
    }
    Ok(cleanup)
}
