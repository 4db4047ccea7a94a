use tracing::debug;

use super::action::LifecycleActionType;
use super::job::job_exists;
use super::tracker::check_action_done;
use crate::client::Reader;
use crate::component::SynthesizedComponent;
use crate::controller::error::Result;
use crate::crd::{Action, Cluster, ClusterPhase, Component, ComponentPhase, PreConditionType};

/// The custom handler of `action_type`, if the component declares one
pub fn check_lifecycle_action(
    synth: &SynthesizedComponent,
    action_type: LifecycleActionType,
) -> Option<&Action> {
    action_type.handler(&synth.lifecycle_actions)
}

/// Whether the action's precondition holds. Unknown preconditions never do.
pub fn precondition_satisfied(action: &Action, cluster: &Cluster, comp: &Component) -> bool {
    match action
        .pre_condition
        .as_ref()
        .unwrap_or(&PreConditionType::ComponentReady)
    {
        PreConditionType::ComponentReady => comp.phase() == Some(&ComponentPhase::Running),
        PreConditionType::ClusterReady => cluster.phase() == Some(&ClusterPhase::Running),
        PreConditionType::Unknown(other) => {
            debug!(precondition = %other, "unknown precondition, action skipped");
            false
        }
    }
}

/// Decide whether `action_type` has to run in this pass.
///
/// The action is finished once its done marker is set and its Job is gone.
pub async fn need_do_action<R: Reader>(
    reader: &R,
    action_type: LifecycleActionType,
    cluster: &Cluster,
    comp: &Component,
    synth: &SynthesizedComponent,
) -> Result<bool> {
    let Some(action) = check_lifecycle_action(synth, action_type) else {
        return Ok(false);
    };
    if !precondition_satisfied(action, cluster, comp) {
        return Ok(false);
    }
    if comp.metadata.annotations.is_none() {
        return Ok(true);
    }

    let job_name = action_type.job_name(&synth.full_comp_name)?;
    let exists = job_exists(reader, &synth.namespace, &job_name).await?;
    let done = check_action_done(cluster, comp, action_type);
    Ok(!(done && !exists))
}
