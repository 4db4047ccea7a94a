//! Deferred object mutation
//!
//! Reconcile code never writes component state directly. It stages intents
//! into a [`Dag`] through the [`GraphClient`]; the reconciler commits the
//! whole graph once at the end of the pass, in dependency order.

mod client;
mod dag;

pub use client::GraphClient;
pub use dag::{Dag, ObjectAction, ObjectVertex};
