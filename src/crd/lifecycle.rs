//! Lifecycle action definitions carried by a Component
//!
//! A component declares its hooks (post-provision, pre-terminate, switchover,
//! member join/leave, data dump/load, probes) as [`LifecycleActionHandler`]s.
//! Only exec-style custom handlers can be run as Jobs; everything else is
//! dispatched to kbagent.

use k8s_openapi::api::core::v1::EnvVar;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Command executed by an action
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecAction {
    /// Command to run, overrides the image entrypoint
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,

    /// Arguments passed to the command
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

/// Retry behaviour of an action
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Maximum number of retries; becomes the Job backoff limit when > 0
    #[serde(default)]
    pub max_retries: i32,

    /// Seconds to wait between retries
    #[serde(default)]
    pub retry_interval: i64,
}

/// Gate that must hold before an action is executed.
///
/// Unrecognised values are preserved so that they can be reported, and are
/// never treated as satisfied.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(from = "String", into = "String")]
#[schemars(with = "String")]
pub enum PreConditionType {
    ComponentReady,
    ClusterReady,
    Unknown(String),
}

impl From<String> for PreConditionType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "ComponentReady" => PreConditionType::ComponentReady,
            "ClusterReady" => PreConditionType::ClusterReady,
            _ => PreConditionType::Unknown(value),
        }
    }
}

impl From<PreConditionType> for String {
    fn from(value: PreConditionType) -> Self {
        match value {
            PreConditionType::ComponentReady => "ComponentReady".to_string(),
            PreConditionType::ClusterReady => "ClusterReady".to_string(),
            PreConditionType::Unknown(other) => other,
        }
    }
}

/// A single action definition
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// Image used when the action runs as a Job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Exec-style handler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<ExecAction>,

    /// Extra environment for the action container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,

    /// Condition that must hold before running; defaults to ComponentReady
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_condition: Option<PreConditionType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i32>,
}

/// Wrapper holding the user supplied handler of an action
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleActionHandler {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_handler: Option<Action>,
}

/// Switchover carries two handlers depending on whether a candidate is named
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSwitchover {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with_candidate: Option<Action>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub without_candidate: Option<Action>,
}

/// Probe actions are handlers run periodically by kbagent
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Probe {
    #[serde(flatten)]
    pub handler: LifecycleActionHandler,

    #[serde(default)]
    pub period_seconds: i32,
}

/// All lifecycle hooks of a component
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentLifecycleActions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_provision: Option<LifecycleActionHandler>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_terminate: Option<LifecycleActionHandler>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switchover: Option<ComponentSwitchover>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_join: Option<LifecycleActionHandler>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_leave: Option<LifecycleActionHandler>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dump: Option<LifecycleActionHandler>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_load: Option<LifecycleActionHandler>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_probe: Option<Probe>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_probe: Option<Probe>,
}

/// Script or config template mounted into the component pods
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentTemplateSpec {
    pub name: String,

    /// ConfigMap holding the template
    #[serde(default)]
    pub template_ref: String,

    /// Pod volume the template is mounted through
    pub volume_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_mode: Option<i32>,
}

/// Role a replica can take
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaRole {
    pub name: String,

    #[serde(default)]
    pub serviceable: bool,

    #[serde(default)]
    pub writable: bool,

    #[serde(default)]
    pub votable: bool,
}
