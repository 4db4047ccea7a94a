//! Health server for Kubernetes probes and Prometheus metrics
//!
//! - `/healthz` liveness
//! - `/readyz` readiness, false until the controller runs and again during shutdown
//! - `/metrics` Prometheus text format

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::net::TcpListener;

const LISTEN_ADDR: &str = "0.0.0.0:8080";

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ComponentLabels {
    pub namespace: String,
    pub component: String,
}

/// Where a lifecycle action stood at the end of a pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionOutcome {
    Created,
    Running,
    Completed,
    Failed,
    Error,
}

impl ActionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionOutcome::Created => "created",
            ActionOutcome::Running => "running",
            ActionOutcome::Completed => "completed",
            ActionOutcome::Failed => "failed",
            ActionOutcome::Error => "error",
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ActionLabels {
    pub action: String,
    pub outcome: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct AgentEventLabels {
    pub reason: String,
}

pub struct Metrics {
    pub reconciliations_total: Family<ComponentLabels, Counter>,
    pub reconciliation_errors_total: Family<ComponentLabels, Counter>,
    pub reconcile_duration_seconds: Family<ComponentLabels, Histogram>,
    /// Lifecycle action outcomes by action type
    pub action_jobs_total: Family<ActionLabels, Counter>,
    /// kbagent events handled, by reason
    pub agent_events_total: Family<AgentEventLabels, Counter>,
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("component_operator");

        let reconciliations_total = Family::<ComponentLabels, Counter>::default();
        registry.register(
            "reconciliations",
            "Component reconcile passes",
            reconciliations_total.clone(),
        );

        let reconciliation_errors_total = Family::<ComponentLabels, Counter>::default();
        registry.register(
            "reconciliation_errors",
            "Component reconcile passes that failed unexpectedly",
            reconciliation_errors_total.clone(),
        );

        let reconcile_duration_seconds =
            Family::<ComponentLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.0, 15))
            });
        registry.register(
            "reconcile_duration_seconds",
            "Duration of a Component reconcile pass",
            reconcile_duration_seconds.clone(),
        );

        let action_jobs_total = Family::<ActionLabels, Counter>::default();
        registry.register(
            "action_jobs",
            "Lifecycle action Job outcomes",
            action_jobs_total.clone(),
        );

        let agent_events_total = Family::<AgentEventLabels, Counter>::default();
        registry.register(
            "agent_events",
            "kbagent events handled",
            agent_events_total.clone(),
        );

        Self {
            reconciliations_total,
            reconciliation_errors_total,
            reconcile_duration_seconds,
            action_jobs_total,
            agent_events_total,
            registry,
        }
    }

    fn component(namespace: &str, component: &str) -> ComponentLabels {
        ComponentLabels {
            namespace: namespace.to_string(),
            component: component.to_string(),
        }
    }

    pub fn record_reconcile(&self, namespace: &str, component: &str, duration_secs: f64) {
        let labels = Self::component(namespace, component);
        self.reconciliations_total.get_or_create(&labels).inc();
        self.reconcile_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    pub fn record_error(&self, namespace: &str, component: &str) {
        self.reconciliation_errors_total
            .get_or_create(&Self::component(namespace, component))
            .inc();
    }

    pub fn record_action(&self, action: &str, outcome: ActionOutcome) {
        self.action_jobs_total
            .get_or_create(&ActionLabels {
                action: action.to_string(),
                outcome: outcome.as_str().to_string(),
            })
            .inc();
    }

    pub fn record_agent_event(&self, reason: &str) {
        self.agent_events_total
            .get_or_create(&AgentEventLabels {
                reason: reason.to_string(),
            })
            .inc();
    }

    fn encode(&self) -> String {
        let mut buffer = String::new();
        if let Err(e) = encode(&mut buffer, &self.registry) {
            tracing::error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        buffer
    }
}

/// State shared between the controller tasks and the health server
pub struct HealthState {
    ready: AtomicBool,
    pub metrics: Metrics,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
            metrics: Metrics::new(),
        }
    }

    pub async fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub async fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

async fn metrics(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.encode(),
    )
}

pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve probes and metrics on port 8080
pub async fn run_health_server(state: Arc<HealthState>) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(LISTEN_ADDR).await?;
    tracing::info!("Health server listening on {}", LISTEN_ADDR);
    axum::serve(listener, create_router(state)).await
}
