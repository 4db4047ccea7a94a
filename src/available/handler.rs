use jiff::Timestamp;
use k8s_openapi::api::core::v1::Event;
use kube::ResourceExt;
use tracing::{debug, info, instrument};

use super::evaluator::evaluate_condition;
use super::probe::{
    AVAILABLE_PROBE_REASON, AgentProbeEvent, ProbeEvent, cached_probe_events, pick_probe_events,
    resolve_available_policy, update_cached_probe_events,
};
use crate::client::Writer;
use crate::controller::error::{Error, Result};
use crate::controller::status::{ConditionBuilder, conditions_changed};
use crate::crd::{Component, ComponentStatus};
use crate::graph::{Dag, GraphClient};
use crate::resources::common::{KBAGENT_FIELD_PATH, KBAGENT_REPORTING_CONTROLLER};

const AVAILABLE_MESSAGE: &str = "Component is available";

/// Outcome of evaluating a probe event against the component policy
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Availability {
    Available,
    Unavailable(String),
}

/// Turns available probe Events into the Component `Available` condition
#[derive(Clone, Copy, Debug, Default)]
pub struct AvailableEventHandler;

impl AvailableEventHandler {
    pub fn is_available_event(event: &Event) -> bool {
        event.reporting_component.as_deref() == Some(KBAGENT_REPORTING_CONTROLLER)
            && event.reason.as_deref() == Some(AVAILABLE_PROBE_REASON)
            && event.involved_object.field_path.as_deref() == Some(KBAGENT_FIELD_PATH)
    }

    /// Handle one Event; returns whether a status write was committed
    #[instrument(skip_all, fields(event = %event.name_any()))]
    pub async fn handle<W: Writer>(&self, client: &W, event: &Event) -> Result<bool> {
        if !Self::is_available_event(event) {
            return Ok(false);
        }
        let agent: AgentProbeEvent =
            serde_json::from_str(event.message.as_deref().unwrap_or_default())?;
        let namespace = event
            .involved_object
            .namespace
            .clone()
            .ok_or(Error::MissingObjectKey(".involvedObject.namespace"))?;
        let orig = client
            .get::<Component>(&namespace, &agent.instance)
            .await?
            .ok_or_else(|| Error::NotFound(format!("component {}", agent.instance)))?;

        let now = Timestamp::now();
        let mut comp = orig.clone();
        let Some(availability) =
            self.evaluate(&mut comp, ProbeEvent::new(event, &agent, now), now)?
        else {
            debug!(component = %agent.instance, "phase based availability, event ignored");
            return Ok(false);
        };

        let mut dag = Dag::new();
        if !stage_status(&mut dag, &orig, &mut comp, &availability)? {
            return Ok(false);
        }
        dag.commit(client).await?;
        info!(component = %agent.instance, availability = ?availability, "available condition updated");
        Ok(true)
    }

    /// Fold `event` into the cached events of `comp` and evaluate its policy.
    ///
    /// Returns `None` when availability is decided by phase instead.
    pub fn evaluate(
        &self,
        comp: &mut Component,
        event: ProbeEvent,
        now: Timestamp,
    ) -> Result<Option<Availability>> {
        let policy = resolve_available_policy(
            comp.spec.available.as_ref(),
            comp.spec.lifecycle_actions.as_ref(),
        );
        let Some((time_window, condition)) = policy
            .with_probe
            .as_ref()
            .and_then(|p| Some((p.time_window?, p.condition.clone()?)))
        else {
            if policy.with_phases.is_some() {
                return Ok(None);
            }
            return Err(Error::InvalidConfig(format!(
                "component {} has no available probe defined, but got a probe event",
                comp.name_any()
            )));
        };

        let replicas = comp.spec.replicas;
        let name = comp.name_any();
        let status = comp.status.get_or_insert_with(ComponentStatus::default);
        let mut events = cached_probe_events(&status.message)?;
        events.push(event);
        let events = pick_probe_events(events, time_window, &name, replicas, now);
        update_cached_probe_events(&mut status.message, &events)?;

        if evaluate_condition(&condition, replicas, &events) {
            Ok(Some(Availability::Available))
        } else {
            Ok(Some(Availability::Unavailable(format!(
                "available probe condition not satisfied by {} of {} replicas",
                events.len(),
                replicas
            ))))
        }
    }
}

/// Set the Available condition on `comp` and stage a status write when the
/// condition or the event cache changed
fn stage_status(
    dag: &mut Dag,
    orig: &Component,
    comp: &mut Component,
    availability: &Availability,
) -> Result<bool> {
    let generation = comp.metadata.generation;
    let status = comp.status.get_or_insert_with(ComponentStatus::default);
    let before = status.conditions.clone();
    let builder = ConditionBuilder::from_existing(before.clone(), generation);
    status.conditions = match availability {
        Availability::Available => builder.available(true, AVAILABLE_MESSAGE),
        Availability::Unavailable(message) => builder.available(false, message),
    }
    .build();

    let orig_messages = orig.status.as_ref().map(|s| &s.message);
    let messages_changed = orig_messages != Some(&status.message)
        && !(orig_messages.is_none() && status.message.is_empty());
    if !conditions_changed(&before, &status.conditions) && !messages_changed {
        return Ok(false);
    }
    GraphClient::new().status(dag, orig, comp)?;
    Ok(true)
}
