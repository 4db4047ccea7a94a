//! Component availability from kbagent probe events
//!
//! kbagent reports the result of the available probe as Events. Each event is
//! folded into a short per-pod history cached in the Component status, the
//! history is evaluated against the availability policy, and the outcome is
//! written back as the `Available` condition.

mod evaluator;
mod handler;
mod probe;

pub use evaluator::{criteria_match, evaluate_condition};
pub use handler::{Availability, AvailableEventHandler};
pub use probe::{
    AVAILABLE_PROBE_EVENTS_KEY, AVAILABLE_PROBE_REASON, AgentProbeEvent, DEFAULT_TIME_WINDOW,
    ProbeEvent, available_policy, cached_probe_events, pick_probe_events,
    resolve_available_policy, update_cached_probe_events,
};
