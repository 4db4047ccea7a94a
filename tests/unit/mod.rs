//! Unit tests for the Component operator
//!
//! This module contains unit tests for:
//! - Action Job rendering and env composition
//! - Action need resolution, done markers and the action state machine
//! - The Component reconcile pass against an in-memory object store
//! - Staged object graph commits
//! - Replica bookkeeping and kbagent task events
//! - Availability evaluation from probe events

#[path = "../common/mod.rs"]
#[allow(dead_code)]
mod common;

mod graph;
mod render;
