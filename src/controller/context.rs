use std::sync::Arc;

use kube::Client;

use crate::client::KubeClient;
use crate::controller::config::OperatorConfig;
use crate::health::HealthState;

/// Shared context for the controller
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Reader/writer used by the reconcile logic
    pub store: KubeClient,
    /// Health state for metrics
    pub health_state: Option<Arc<HealthState>>,
    pub config: OperatorConfig,
}

impl Context {
    pub fn new(client: Client, health_state: Option<Arc<HealthState>>, config: OperatorConfig) -> Self {
        Self {
            store: KubeClient::new(client.clone()),
            client,
            health_state,
            config,
        }
    }
}
