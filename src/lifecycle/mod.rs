//! Lifecycle action engine
//!
//! For each declared action the engine decides whether it must run
//! ([`resolver`]), renders and stages its Job ([`render`],
//! [`orchestrator`]), follows the Job to completion ([`job`]) and records
//! the outcome as a done marker before scheduling cleanup ([`tracker`]).

pub mod action;
pub mod job;
pub mod orchestrator;
pub mod render;
pub mod resolver;
pub mod tracker;

pub use action::{JobActionSpec, LifecycleActionType};
pub use job::{JobState, check_job_succeed, clean_job_with_dag, clean_jobs_with_labels, job_state};
pub use orchestrator::{
    ActionPhase, EnsuredJob, ensure_action_job, reconcile_action, reconcile_comp_post_provision,
    reconcile_comp_pre_terminate,
};
pub use render::{ActionContext, render_action_job};
pub use resolver::{check_lifecycle_action, need_do_action};
pub use tracker::{check_action_done, clean_action_job, legacy_done_key, set_action_done};
