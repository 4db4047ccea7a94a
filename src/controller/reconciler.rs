//! Reconciliation logic for Component resources
//!
//! One pass stages every mutation into a [`Dag`] and commits it at the end.
//! Live components get the replica status sync and the post-provision
//! action; deleting components run pre-terminate before the finalizer is
//! released.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;
use kube::core::ObjectMeta;
use kube::runtime::controller::Action;
use tracing::{debug, error, info, instrument, warn};

use crate::client::Writer;
use crate::component::{SynthesizedComponent, is_deleting, list_component_pods};
use crate::controller::config::OperatorConfig;
use crate::controller::context::Context;
use crate::controller::error::{BackoffConfig, Error, Result};
use crate::crd::{Cluster, Component, InstanceSet};
use crate::graph::{Dag, GraphClient};
use crate::health::{ActionOutcome, Metrics};
use crate::lifecycle::{
    ActionPhase, LifecycleActionType, clean_jobs_with_labels, reconcile_comp_post_provision,
    reconcile_comp_pre_terminate,
};
use crate::replicas::{ReplicaActions, env_config_map_name, sync_replicas_status};
use crate::resources::common::{
    APP_INSTANCE_LABEL_KEY, FINALIZER, component_labels, set_controller_reference,
};

/// Periodic resync of a settled component
pub const RESYNC_INTERVAL: Duration = Duration::from_secs(60);

fn default_backoff() -> BackoffConfig {
    BackoffConfig::default()
}

/// Main reconciliation function
#[instrument(skip(comp, ctx), fields(name = %comp.name_any(), namespace = comp.namespace().unwrap_or_default()))]
pub async fn reconcile(comp: Arc<Component>, ctx: Arc<Context>) -> Result<Action> {
    let start = Instant::now();
    let metrics = ctx.health_state.as_ref().map(|s| &s.metrics);

    let result = reconcile_component(&ctx.store, &comp, &ctx.config, metrics).await;

    if let Some(metrics) = metrics {
        let ns = comp.namespace().unwrap_or_default();
        match &result {
            Err(e) if !e.is_expected() => metrics.record_error(&ns, &comp.name_any()),
            _ => metrics.record_reconcile(&ns, &comp.name_any(), start.elapsed().as_secs_f64()),
        }
    }
    result
}

/// Error policy for the controller with exponential backoff
pub fn error_policy(comp: Arc<Component>, error: &Error, _ctx: Arc<Context>) -> Action {
    let name = comp.name_any();
    let delay = default_backoff().delay_for_error(error, 0);

    if error.is_expected() {
        debug!(component = %name, "{}, requeuing in {:?}", error, delay);
    } else if error.is_retryable() {
        warn!("Retryable error for {}: {:?}, requeuing in {:?}", name, error, delay);
    } else {
        error!(
            "Non-retryable error for {}: {:?}, requeuing in {:?} for manual intervention",
            name, error, delay
        );
    }

    Action::requeue(delay)
}

/// Reconcile one Component against any [`Writer`]
pub async fn reconcile_component<W: Writer>(
    client: &W,
    comp: &Component,
    config: &OperatorConfig,
    metrics: Option<&Metrics>,
) -> Result<Action> {
    let ns = comp
        .namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let cluster_name = comp.labels().get(APP_INSTANCE_LABEL_KEY).ok_or_else(|| {
        Error::InvalidConfig(format!(
            "component {} has no {} label",
            comp.name_any(),
            APP_INSTANCE_LABEL_KEY
        ))
    })?;
    let cluster = client
        .get::<Cluster>(&ns, cluster_name)
        .await?
        .ok_or_else(|| Error::NotFound(format!("cluster {cluster_name}")))?;
    let synth = SynthesizedComponent::build(&cluster, comp)?;
    let tolerations = config.data_plane_tolerations.as_slice();

    let mut dag = Dag::new();
    let mut working = comp.clone();

    if is_deleting(comp) {
        if !has_finalizer(comp) {
            return Ok(Action::await_change());
        }
        let outcome = reconcile_comp_pre_terminate(
            client,
            &mut dag,
            &cluster,
            &mut working,
            &synth,
            tolerations,
        )
        .await;
        record_action(metrics, LifecycleActionType::PreTerminate, &outcome);
        let phase = commit_on_progress(client, &dag, outcome).await?;
        if phase == ActionPhase::JobCreated {
            return Ok(Action::requeue(default_backoff().in_process_delay));
        }

        release_finalizer(client, comp, &synth).await?;
        return Ok(Action::await_change());
    }

    if !has_finalizer(comp) {
        working.finalizers_mut().push(FINALIZER.to_string());
        GraphClient::new().patch(&mut dag, comp, &working)?;
    }

    sync_instance_set(client, &mut dag, comp, &synth).await?;

    let outcome =
        reconcile_comp_post_provision(client, &mut dag, &cluster, &mut working, &synth, tolerations)
            .await;
    record_action(metrics, LifecycleActionType::PostProvision, &outcome);
    let phase = commit_on_progress(client, &dag, outcome).await?;

    match phase {
        ActionPhase::JobCreated => Ok(Action::requeue(default_backoff().in_process_delay)),
        ActionPhase::NotNeeded | ActionPhase::Completed => Ok(Action::requeue(RESYNC_INTERVAL)),
    }
}

/// Commit the staged mutations when the pass made progress.
///
/// Expected requeues still commit what was staged before handing the error
/// back; other errors discard the DAG.
async fn commit_on_progress<W: Writer>(
    client: &W,
    dag: &Dag,
    outcome: Result<ActionPhase>,
) -> Result<ActionPhase> {
    match outcome {
        Ok(phase) => {
            dag.commit(client).await?;
            Ok(phase)
        }
        Err(e) if e.is_expected() => {
            dag.commit(client).await?;
            Err(e)
        }
        Err(e) => Err(e),
    }
}

/// Stage the replica status sync of the component's InstanceSet, if any,
/// along with the new-replica task it hands to kbagent
async fn sync_instance_set<W: Writer>(
    client: &W,
    dag: &mut Dag,
    comp: &Component,
    synth: &SynthesizedComponent,
) -> Result<()> {
    let Some(running) = client
        .get::<InstanceSet>(&synth.namespace, &synth.full_comp_name)
        .await?
    else {
        debug!("instance set not created yet");
        return Ok(());
    };
    let pods =
        list_component_pods(client, &synth.namespace, &synth.cluster_name, &synth.name).await?;
    let mut proto = running.clone();
    let actions = ReplicaActions::from_lifecycle(&synth.lifecycle_actions);
    let parameters = sync_replicas_status(&running, &mut proto, &pods, actions)?;

    if let Some(parameters) = parameters {
        stage_task_parameters(client, dag, comp, synth, parameters).await?;
    }
    if proto.annotations() != running.annotations() {
        GraphClient::new().update(dag, &running, &proto)?;
    }
    Ok(())
}

/// Merge task parameters into the component env ConfigMap, creating it when
/// missing
async fn stage_task_parameters<W: Writer>(
    client: &W,
    dag: &mut Dag,
    comp: &Component,
    synth: &SynthesizedComponent,
    parameters: BTreeMap<String, String>,
) -> Result<()> {
    let graph = GraphClient::new();
    let name = env_config_map_name(&synth.full_comp_name);
    match client.get::<ConfigMap>(&synth.namespace, &name).await? {
        Some(running) => {
            let mut cm = running.clone();
            cm.data.get_or_insert_with(BTreeMap::new).extend(parameters);
            if cm.data != running.data {
                graph.update(dag, &running, &cm)?;
            }
        }
        None => {
            let mut cm = ConfigMap {
                metadata: ObjectMeta {
                    name: Some(name),
                    namespace: Some(synth.namespace.clone()),
                    labels: Some(component_labels(&synth.cluster_name, &synth.name)),
                    ..Default::default()
                },
                data: Some(parameters),
                ..Default::default()
            };
            set_controller_reference(comp, &mut cm);
            graph.create(dag, &cm)?;
        }
    }
    debug!(component = %synth.full_comp_name, "new replica task staged");
    Ok(())
}

fn record_action(
    metrics: Option<&Metrics>,
    action_type: LifecycleActionType,
    outcome: &Result<ActionPhase>,
) {
    let Some(metrics) = metrics else {
        return;
    };
    let label = match outcome {
        Ok(ActionPhase::NotNeeded) => return,
        Ok(ActionPhase::JobCreated) => ActionOutcome::Created,
        Ok(ActionPhase::Completed) | Err(Error::RequeueAfter(..)) => ActionOutcome::Completed,
        Err(Error::ExpectedInProcess(_)) => ActionOutcome::Running,
        Err(Error::JobFailed(_)) => ActionOutcome::Failed,
        Err(_) => ActionOutcome::Error,
    };
    metrics.record_action(action_type.name(), label);
}

/// Check if the finalizer is present
fn has_finalizer(comp: &Component) -> bool {
    comp.finalizers().iter().any(|f| f == FINALIZER)
}

/// Drop our finalizer so that the deletion can proceed.
///
/// Post-provision Jobs still around get the cleanup TTL in the same commit.
async fn release_finalizer<W: Writer>(
    client: &W,
    comp: &Component,
    synth: &SynthesizedComponent,
) -> Result<()> {
    let graph = GraphClient::new();
    let mut dag = Dag::new();
    let labels =
        LifecycleActionType::PostProvision.job_labels(&synth.cluster_name, &synth.name)?;
    clean_jobs_with_labels(client, &graph, &mut dag, &synth.namespace, &labels).await?;

    let mut released = comp.clone();
    released.finalizers_mut().retain(|f| f != FINALIZER);
    graph.patch(&mut dag, comp, &released)?;
    dag.commit(client).await?;
    info!(component = %comp.name_any(), "Removed finalizer");
    Ok(())
}
