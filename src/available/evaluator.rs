//! Interpreter of [`ComponentAvailableCondition`] expressions

use super::probe::ProbeEvent;
use crate::crd::{
    ActionCriteria, ActionOutputMatcher, ComponentAvailableCondition, ComponentAvailableConditionX,
};

/// Evaluate `cond` over the latest probe event of each replica.
///
/// Only the first populated operator counts, in the order and, or, not, all,
/// any, none, majority. An empty condition holds.
pub fn evaluate_condition(
    cond: &ComponentAvailableCondition,
    replicas: i32,
    events: &[ProbeEvent],
) -> bool {
    if !cond.and.is_empty() {
        return cond.and.iter().all(|x| evaluate_condition_x(x, replicas, events));
    }
    if !cond.or.is_empty() {
        return cond.or.iter().any(|x| evaluate_condition_x(x, replicas, events));
    }
    if let Some(x) = cond.not.as_deref() {
        return !evaluate_condition_x(x, replicas, events);
    }
    if let Some(x) = cond.all.as_deref() {
        return strict_check(x, replicas, events)
            && events.iter().all(|e| evaluate_single(x, replicas, e));
    }
    if let Some(x) = cond.any.as_deref() {
        return strict_check(x, replicas, events)
            && events.iter().any(|e| evaluate_single(x, replicas, e));
    }
    if let Some(x) = cond.none.as_deref() {
        return strict_check(x, replicas, events)
            && !events.iter().any(|e| evaluate_single(x, replicas, e));
    }
    if let Some(x) = cond.majority.as_deref() {
        let count = events
            .iter()
            .filter(|e| evaluate_single(x, replicas, e))
            .count();
        return i64::try_from(count).unwrap_or(i64::MAX) > i64::from(replicas / 2);
    }
    true
}

fn evaluate_single(x: &ComponentAvailableConditionX, replicas: i32, event: &ProbeEvent) -> bool {
    evaluate_condition_x(x, replicas, std::slice::from_ref(event))
}

/// With `strict`, every replica must have reported
fn strict_check(x: &ComponentAvailableConditionX, replicas: i32, events: &[ProbeEvent]) -> bool {
    if x.strict == Some(true) {
        return usize::try_from(replicas).ok() == Some(events.len());
    }
    true
}

fn evaluate_condition_x(
    x: &ComponentAvailableConditionX,
    replicas: i32,
    events: &[ProbeEvent],
) -> bool {
    if !x.criteria.is_empty() {
        return events.iter().any(|e| criteria_match(&x.criteria, e));
    }
    if !x.condition.is_empty() {
        return evaluate_condition(&x.condition, replicas, events);
    }
    true
}

/// Whether a single event satisfies every populated criterion
pub fn criteria_match(criteria: &ActionCriteria, event: &ProbeEvent) -> bool {
    if let Some(succeed) = criteria.succeed {
        if succeed != (event.code == 0) {
            return false;
        }
    }
    output_match(criteria.stdout.as_ref(), &event.stdout)
        && output_match(criteria.stderr.as_ref(), &event.stderr)
}

fn output_match(matcher: Option<&ActionOutputMatcher>, output: &str) -> bool {
    let Some(matcher) = matcher else {
        return true;
    };
    matcher.equal_to.as_deref().is_none_or(|v| output == v)
        && matcher.contains.as_deref().is_none_or(|v| output.contains(v))
}
