//! Operator configuration read from the environment

use k8s_openapi::api::core::v1::Toleration;
use tracing::warn;

use crate::controller::error::{Error, Result};

/// Namespace to watch; cluster-wide when unset
pub const WATCH_NAMESPACE_ENV: &str = "WATCH_NAMESPACE";

/// JSON list of tolerations added to every action Job
pub const DATA_PLANE_TOLERATIONS_ENV: &str = "DATA_PLANE_TOLERATIONS";

/// Leader election identity, from the downward API
pub const POD_NAME_ENV: &str = "POD_NAME";
pub const POD_NAMESPACE_ENV: &str = "POD_NAMESPACE";

const DEFAULT_LEASE_NAMESPACE: &str = "default";

#[derive(Clone, Debug, Default)]
pub struct OperatorConfig {
    pub watch_namespace: Option<String>,
    pub data_plane_tolerations: Vec<Toleration>,
    /// Lease holder id; the hostname when `POD_NAME` is unset
    pub pod_name: String,
    /// Namespace holding the leader lease
    pub pod_namespace: String,
}

impl OperatorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let watch_namespace = lookup(WATCH_NAMESPACE_ENV).filter(|ns| !ns.is_empty());
        let data_plane_tolerations = match lookup(DATA_PLANE_TOLERATIONS_ENV) {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw).map_err(|e| {
                Error::InvalidConfig(format!("{DATA_PLANE_TOLERATIONS_ENV} is not a toleration list: {e}"))
            })?,
            _ => Vec::new(),
        };
        let pod_name = lookup(POD_NAME_ENV)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| {
                warn!("{POD_NAME_ENV} not set, using hostname");
                hostname::get()
                    .map(|h| h.to_string_lossy().to_string())
                    .unwrap_or_else(|_| "unknown".to_string())
            });
        let pod_namespace = lookup(POD_NAMESPACE_ENV)
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| DEFAULT_LEASE_NAMESPACE.to_string());
        Ok(Self {
            watch_namespace,
            data_plane_tolerations,
            pod_name,
            pod_namespace,
        })
    }
}
