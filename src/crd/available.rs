//! Availability policy of a component
//!
//! The policy is either phase based (`withPhases`) or driven by the events of
//! the available probe (`withProbe`), in which case the events are evaluated
//! against a [`ComponentAvailableCondition`] expression tree.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentAvailable {
    /// Component phase that counts as available, e.g. "Running"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with_phases: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with_probe: Option<ComponentAvailableWithProbe>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentAvailableWithProbe {
    /// Seconds of probe history taken into account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ComponentAvailableCondition>,
}

/// Boolean expression over probe events.
///
/// Only the first populated operator is evaluated, in the order
/// and, or, not, all, any, none, majority. An empty condition holds.
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentAvailableCondition {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub and: Vec<ComponentAvailableConditionX>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub or: Vec<ComponentAvailableConditionX>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not: Option<Box<ComponentAvailableConditionX>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all: Option<Box<ComponentAvailableConditionX>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub any: Option<Box<ComponentAvailableConditionX>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub none: Option<Box<ComponentAvailableConditionX>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub majority: Option<Box<ComponentAvailableConditionX>>,
}

impl ComponentAvailableCondition {
    pub fn is_empty(&self) -> bool {
        self == &ComponentAvailableCondition::default()
    }
}

/// Operand of a condition: either leaf criteria or a nested condition
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentAvailableConditionX {
    #[serde(flatten)]
    pub criteria: ActionCriteria,

    #[serde(flatten)]
    pub condition: ComponentAvailableCondition,

    /// Require an event from every replica before evaluating
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionCriteria {
    /// Expected outcome: exit code 0 when true, non-zero when false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub succeed: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<ActionOutputMatcher>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<ActionOutputMatcher>,
}

impl ActionCriteria {
    pub fn is_empty(&self) -> bool {
        self == &ActionCriteria::default()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutputMatcher {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equal_to: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
}
