pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod reconciler;
pub mod status;

pub use config::OperatorConfig;
pub use context::Context;
pub use error::{BackoffConfig, Error, Result};
pub use events::handle_agent_event;
pub use reconciler::{RESYNC_INTERVAL, error_policy, reconcile, reconcile_component};
pub use status::{ConditionBuilder, conditions_changed};
