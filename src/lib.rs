pub mod available;
pub mod client;
pub mod component;
pub mod controller;
pub mod crd;
pub mod graph;
pub mod health;
pub mod lifecycle;
pub mod replicas;
pub mod resources;

pub use controller::{
    BackoffConfig, Context, Error, OperatorConfig, Result, error_policy, handle_agent_event,
    reconcile,
};
pub use crd::{Cluster, Component, InstanceSet};
pub use health::{HealthState, Metrics};
pub use resources::common::FINALIZER;

use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Event;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::{Controller, WatchStreamExt, watcher};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;

use crate::client::KubeClient;

/// Helper to create a namespaced or cluster-wide API based on scope.
fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Run the Component controller, scoped by `config.watch_namespace`.
///
/// If health_state is provided, metrics will be recorded for reconciliations.
pub async fn run_controller(
    client: Client,
    health_state: Option<Arc<HealthState>>,
    config: OperatorConfig,
) {
    let namespace = config.watch_namespace.clone();
    let scope_msg = namespace.as_deref().unwrap_or("cluster-wide");
    tracing::info!(
        "Starting controller for Component resources (scope: {})",
        scope_msg
    );

    // Mark as ready once we start the controller
    if let Some(ref state) = health_state {
        state.set_ready(true).await;
    }

    let ctx = Arc::new(Context::new(client.clone(), health_state, config));

    let components: Api<Component> = scoped_api(client.clone(), namespace.as_deref());
    let jobs: Api<Job> = scoped_api(client.clone(), namespace.as_deref());
    let instance_sets: Api<InstanceSet> = scoped_api(client, namespace.as_deref());

    let watcher_config = WatcherConfig::default().any_semantic();

    // Action Jobs are owned by their Component; InstanceSets share its name
    Controller::new(components, watcher_config.clone())
        .owns(jobs, watcher_config.clone())
        .owns(instance_sets, watcher_config)
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    tracing::debug!("Reconciled: {}", obj.name);
                }
                Err(e) => {
                    // Watch events for an object deleted in the meantime end up here
                    let is_not_found = matches!(
                        &e,
                        kube::runtime::controller::Error::ReconcilerFailed(err, _) if err.is_not_found()
                    );
                    let is_expected = matches!(
                        &e,
                        kube::runtime::controller::Error::ReconcilerFailed(err, _) if err.is_expected()
                    );
                    if is_not_found || is_expected {
                        tracing::debug!("Reconcile requeued: {:?}", e);
                    } else {
                        tracing::error!("Reconciliation error: {:?}", e);
                    }
                }
            }
        })
        .await;

    // This should never complete in normal operation
    tracing::error!("Controller stream ended unexpectedly");
}

/// Watch kbagent Events and hand them to the availability and replica task
/// handlers.
pub async fn run_event_watcher(
    client: Client,
    health_state: Option<Arc<HealthState>>,
    namespace: Option<String>,
) {
    let scope_msg = namespace.as_deref().unwrap_or("cluster-wide");
    tracing::info!("Starting kbagent event watcher (scope: {})", scope_msg);

    let events: Api<Event> = scoped_api(client.clone(), namespace.as_deref());
    let store = KubeClient::new(client);
    let metrics = health_state.as_ref().map(|s| &s.metrics);

    let stream = watcher(events, WatcherConfig::default().any_semantic())
        .default_backoff()
        .applied_objects();
    futures::pin_mut!(stream);

    loop {
        match stream.try_next().await {
            Ok(Some(event)) => {
                if let Err(e) = handle_agent_event(&store, &event, metrics).await {
                    if e.is_retryable() {
                        tracing::warn!("Failed to handle event: {}", e);
                    } else {
                        tracing::error!("Failed to handle event: {:?}", e);
                    }
                }
            }
            Ok(None) => break,
            Err(e) => tracing::warn!("Event watch error: {}", e),
        }
    }

    tracing::error!("Event watcher stream ended unexpectedly");
}
