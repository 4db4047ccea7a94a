//! Probe events and the availability policy they are evaluated under

use std::collections::{BTreeMap, BTreeSet};

use jiff::{SignedDuration, Timestamp};
use k8s_openapi::api::core::v1::Event;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use serde::{Deserialize, Serialize};

use crate::component::{SynthesizedComponent, generate_pod_names};
use crate::controller::error::Result;
use crate::crd::{
    ActionCriteria, ComponentAvailable, ComponentAvailableCondition,
    ComponentAvailableConditionX, ComponentAvailableWithProbe, ComponentLifecycleActions,
    ComponentPhase,
};

/// Reason of the Events reporting available probe results
pub const AVAILABLE_PROBE_REASON: &str = "availableProbe";

/// Key of the probe event cache in the Component status messages
pub const AVAILABLE_PROBE_EVENTS_KEY: &str = "availableProbeEvents";

/// Time window, in seconds, used when the policy names none
pub const DEFAULT_TIME_WINDOW: i32 = 10;

/// Probe result as reported by kbagent in the Event message
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentProbeEvent {
    /// Full component name
    pub instance: String,
    #[serde(default)]
    pub probe: String,
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub message: String,
}

/// Probe result of one pod at one point in time
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProbeEvent {
    pub pod_name: String,
    #[serde(rename = "podUID", default)]
    pub pod_uid: String,
    pub timestamp: Timestamp,
    pub code: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

impl ProbeEvent {
    /// Combine the Event envelope with the agent report it carries.
    ///
    /// The agent output becomes stdout and its message stderr. Events without
    /// a timestamp are stamped with `now`.
    pub fn new(event: &Event, agent: &AgentProbeEvent, now: Timestamp) -> Self {
        Self {
            pod_name: event.involved_object.name.clone().unwrap_or_default(),
            pod_uid: event.involved_object.uid.clone().unwrap_or_default(),
            timestamp: event
                .last_timestamp
                .as_ref()
                .and_then(to_timestamp)
                .unwrap_or(now),
            code: agent.code,
            stdout: agent.output.clone(),
            stderr: agent.message.clone(),
        }
    }
}

/// Convert an apimachinery time; `None` when it is outside the jiff range
fn to_timestamp(time: &Time) -> Option<Timestamp> {
    let nanos = i32::try_from(time.0.timestamp_subsec_nanos()).ok()?;
    Timestamp::new(time.0.timestamp(), nanos).ok()
}

/// Decode the probe events cached in the status messages
pub fn cached_probe_events(messages: &BTreeMap<String, String>) -> Result<Vec<ProbeEvent>> {
    match messages.get(AVAILABLE_PROBE_EVENTS_KEY) {
        Some(raw) => Ok(serde_json::from_str(raw)?),
        None => Ok(Vec::new()),
    }
}

/// Store `events` as the probe event cache
pub fn update_cached_probe_events(
    messages: &mut BTreeMap<String, String>,
    events: &[ProbeEvent],
) -> Result<()> {
    if messages.is_empty() && events.is_empty() {
        return Ok(());
    }
    messages.insert(
        AVAILABLE_PROBE_EVENTS_KEY.to_string(),
        serde_json::to_string(events)?,
    );
    Ok(())
}

/// Events that still count: newer than `now - time_window`, from a pod the
/// component should have, and only the latest one per pod (ordered by pod
/// name)
pub fn pick_probe_events(
    events: impl IntoIterator<Item = ProbeEvent>,
    time_window: i32,
    full_comp_name: &str,
    replicas: i32,
    now: Timestamp,
) -> Vec<ProbeEvent> {
    let since = now
        .checked_sub(SignedDuration::from_secs(i64::from(time_window)))
        .unwrap_or(Timestamp::MIN);
    let pods: BTreeSet<String> = generate_pod_names(full_comp_name, replicas)
        .into_iter()
        .collect();

    let mut latest: BTreeMap<String, ProbeEvent> = BTreeMap::new();
    for event in events {
        if event.timestamp <= since || !pods.contains(&event.pod_name) {
            continue;
        }
        match latest.get(&event.pod_name) {
            Some(kept) if kept.timestamp >= event.timestamp => {}
            _ => {
                latest.insert(event.pod_name.clone(), event);
            }
        }
    }
    latest.into_values().collect()
}

/// Effective availability policy of a component
pub fn available_policy(synth: &SynthesizedComponent) -> ComponentAvailable {
    resolve_available_policy(synth.available.as_ref(), Some(&synth.lifecycle_actions))
}

/// Apply the policy defaults.
///
/// A declared probe policy without a window takes the probe period (or
/// [`DEFAULT_TIME_WINDOW`] without a probe). With no declared policy, an
/// available probe means every replica must succeed within a probe period;
/// otherwise the component is available while Running.
pub fn resolve_available_policy(
    available: Option<&ComponentAvailable>,
    actions: Option<&ComponentLifecycleActions>,
) -> ComponentAvailable {
    let probe_period = actions
        .and_then(|a| a.available_probe.as_ref())
        .map(|p| p.period_seconds);

    if let Some(available) = available {
        let mut policy = available.clone();
        if let Some(with_probe) = policy.with_probe.as_mut() {
            if with_probe.time_window.is_none() {
                with_probe.time_window = Some(probe_period.unwrap_or(DEFAULT_TIME_WINDOW));
            }
        }
        return policy;
    }

    if let Some(period) = probe_period {
        return ComponentAvailable {
            with_phases: None,
            with_probe: Some(ComponentAvailableWithProbe {
                time_window: Some(period),
                condition: Some(ComponentAvailableCondition {
                    all: Some(Box::new(ComponentAvailableConditionX {
                        criteria: ActionCriteria {
                            succeed: Some(true),
                            ..Default::default()
                        },
                        ..Default::default()
                    })),
                    ..Default::default()
                }),
            }),
        };
    }

    ComponentAvailable {
        with_phases: Some(ComponentPhase::Running.to_string()),
        with_probe: None,
    }
}
