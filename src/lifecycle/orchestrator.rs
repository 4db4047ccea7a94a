use std::time::Duration;

use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Toleration;
use tracing::{debug, info, instrument};

use super::action::LifecycleActionType;
use super::job::check_job_succeed;
use super::render::{ActionContext, render_action_job};
use super::resolver::{check_lifecycle_action, need_do_action};
use super::tracker::{clean_action_job, set_action_done};
use crate::client::Reader;
use crate::component::SynthesizedComponent;
use crate::controller::error::{Error, Result};
use crate::crd::{Cluster, Component};
use crate::graph::{Dag, GraphClient, ObjectAction};
use crate::resources::common::set_controller_reference;

/// Delay before checking that a pre-terminate Job cleanup has landed
pub const PRE_TERMINATE_CLEANUP_REQUEUE: Duration = Duration::from_secs(5);

/// Outcome of one reconcile pass over an action
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionPhase {
    /// Nothing to do: no handler, precondition unmet, or already done
    NotNeeded,
    /// The Job creation was staged in the DAG
    JobCreated,
    /// The Job succeeded; done marker and cleanup are staged
    Completed,
}

/// Job returned by [`ensure_action_job`]
#[derive(Clone, Debug)]
pub enum EnsuredJob {
    /// Rendered and staged for creation by this call
    Created(Job),
    /// Creation was already staged earlier in this pass
    Staged(Job),
    /// Present in the cluster
    Existing(Job),
}

impl EnsuredJob {
    pub fn job(&self) -> &Job {
        match self {
            EnsuredJob::Created(job) | EnsuredJob::Staged(job) | EnsuredJob::Existing(job) => job,
        }
    }
}

/// Make sure exactly one Job exists (or is staged) for the action.
///
/// Returns `None` when the component declares no handler for the action.
pub async fn ensure_action_job<R: Reader>(
    reader: &R,
    graph: &GraphClient,
    dag: &mut Dag,
    ctx: &ActionContext<'_>,
    comp: &Component,
) -> Result<Option<EnsuredJob>> {
    if check_lifecycle_action(ctx.synth, ctx.action_type).is_none() {
        return Ok(None);
    }
    let namespace = &ctx.synth.namespace;
    let job_name = ctx.action_type.job_name(&ctx.synth.full_comp_name)?;

    if let Some((job, ObjectAction::Create)) = dag.find_typed::<Job>(namespace, &job_name)? {
        return Ok(Some(EnsuredJob::Staged(job)));
    }
    if let Some(job) = reader.get::<Job>(namespace, &job_name).await? {
        return Ok(Some(EnsuredJob::Existing(job)));
    }

    let mut job = render_action_job(reader, ctx).await?;
    set_controller_reference(comp, &mut job);
    graph.create(dag, &job)?;
    info!(job = %job_name, action = %ctx.action_type, "action job staged for creation");
    Ok(Some(EnsuredJob::Created(job)))
}

/// Drive one action through need, Job, completion, done marker and cleanup
#[instrument(skip_all, fields(component = %synth.full_comp_name, action = %action_type))]
pub async fn reconcile_action<R: Reader>(
    reader: &R,
    dag: &mut Dag,
    cluster: &Cluster,
    comp: &mut Component,
    synth: &SynthesizedComponent,
    action_type: LifecycleActionType,
    data_plane_tolerations: &[Toleration],
) -> Result<ActionPhase> {
    if !need_do_action(reader, action_type, cluster, comp, synth).await? {
        debug!("action not needed");
        return Ok(ActionPhase::NotNeeded);
    }

    let graph = GraphClient::new();
    let ctx = ActionContext {
        cluster,
        synth,
        action_type,
        data_plane_tolerations,
    };
    let job = match ensure_action_job(reader, &graph, dag, &ctx, comp).await? {
        None => return Ok(ActionPhase::NotNeeded),
        Some(EnsuredJob::Created(_)) | Some(EnsuredJob::Staged(_)) => {
            return Ok(ActionPhase::JobCreated);
        }
        Some(EnsuredJob::Existing(job)) => job,
    };

    let job_name = action_type.job_name(&synth.full_comp_name)?;
    check_job_succeed(reader, &synth.namespace, &job_name).await?;

    set_action_done(&graph, dag, comp, action_type)?;
    clean_action_job(&graph, dag, cluster, comp, action_type, &job)?;
    info!(job = %job_name, "action completed");
    Ok(ActionPhase::Completed)
}

/// Run the post-provision action of a component
pub async fn reconcile_comp_post_provision<R: Reader>(
    reader: &R,
    dag: &mut Dag,
    cluster: &Cluster,
    comp: &mut Component,
    synth: &SynthesizedComponent,
    data_plane_tolerations: &[Toleration],
) -> Result<ActionPhase> {
    reconcile_action(
        reader,
        dag,
        cluster,
        comp,
        synth,
        LifecycleActionType::PostProvision,
        data_plane_tolerations,
    )
    .await
}

/// Run the pre-terminate action of a component.
///
/// Completion is reported as a requeue so that the caller comes back once the
/// Job cleanup has been applied.
pub async fn reconcile_comp_pre_terminate<R: Reader>(
    reader: &R,
    dag: &mut Dag,
    cluster: &Cluster,
    comp: &mut Component,
    synth: &SynthesizedComponent,
    data_plane_tolerations: &[Toleration],
) -> Result<ActionPhase> {
    let phase = reconcile_action(
        reader,
        dag,
        cluster,
        comp,
        synth,
        LifecycleActionType::PreTerminate,
        data_plane_tolerations,
    )
    .await?;
    if phase == ActionPhase::Completed {
        return Err(Error::RequeueAfter(
            PRE_TERMINATE_CLEANUP_REQUEUE,
            "requeue to wait for pre-terminate job cleanup".to_string(),
        ));
    }
    Ok(phase)
}
