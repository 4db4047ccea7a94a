//! Conditions on the Component status subresource

use chrono::Utc;

use crate::crd::Condition;

/// Condition types set by this operator
pub mod condition_types {
    /// The component serves traffic according to its availability policy
    pub const AVAILABLE: &str = "Available";
}

/// Condition status values
pub mod condition_status {
    pub const TRUE: &str = "True";
    pub const FALSE: &str = "False";
    pub const UNKNOWN: &str = "Unknown";
}

/// Condition reasons
pub mod condition_reasons {
    pub const AVAILABLE: &str = "Available";
    pub const UNAVAILABLE: &str = "Unavailable";
}

/// Builder for creating and updating status conditions
pub struct ConditionBuilder {
    conditions: Vec<Condition>,
    generation: Option<i64>,
}

impl ConditionBuilder {
    pub fn new(generation: Option<i64>) -> Self {
        Self {
            conditions: Vec::new(),
            generation,
        }
    }

    /// Start from the conditions currently on the object
    pub fn from_existing(existing: Vec<Condition>, generation: Option<i64>) -> Self {
        Self {
            conditions: existing,
            generation,
        }
    }

    /// Set a condition, updating if it exists or adding if it doesn't.
    ///
    /// The transition time only moves when the status changes.
    pub fn set_condition(mut self, type_: &str, status: &str, reason: &str, message: &str) -> Self {
        let now = Utc::now().to_rfc3339();

        if let Some(existing) = self.conditions.iter_mut().find(|c| c.type_ == type_) {
            if existing.status != status {
                existing.status = status.to_string();
                existing.last_transition_time = now;
            }
            existing.reason = reason.to_string();
            existing.message = message.to_string();
            existing.observed_generation = self.generation;
        } else {
            self.conditions.push(Condition {
                type_: type_.to_string(),
                status: status.to_string(),
                reason: reason.to_string(),
                message: message.to_string(),
                last_transition_time: now,
                observed_generation: self.generation,
            });
        }
        self
    }

    /// Set the Available condition
    pub fn available(self, is_available: bool, message: &str) -> Self {
        if is_available {
            self.set_condition(
                condition_types::AVAILABLE,
                condition_status::TRUE,
                condition_reasons::AVAILABLE,
                message,
            )
        } else {
            self.set_condition(
                condition_types::AVAILABLE,
                condition_status::FALSE,
                condition_reasons::UNAVAILABLE,
                message,
            )
        }
    }

    pub fn build(self) -> Vec<Condition> {
        self.conditions
    }
}

/// Whether two condition lists differ in anything but transition times
pub fn conditions_changed(before: &[Condition], after: &[Condition]) -> bool {
    before.len() != after.len()
        || before.iter().zip(after).any(|(a, b)| {
            a.type_ != b.type_
                || a.status != b.status
                || a.reason != b.reason
                || a.message != b.message
                || a.observed_generation != b.observed_generation
        })
}
