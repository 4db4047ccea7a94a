//! Dispatch of kbagent Events to their handlers

use k8s_openapi::api::core::v1::Event;
use kube::ResourceExt;
use tracing::{debug, instrument};

use crate::available::AvailableEventHandler;
use crate::client::Writer;
use crate::controller::error::{Error, Result};
use crate::health::Metrics;
use crate::replicas::{handle_new_replica_task_event, is_task_event, parse_task_event};

/// Route one Event; returns whether a handler took it
#[instrument(skip_all, fields(event = %event.name_any()))]
pub async fn handle_agent_event<W: Writer>(
    client: &W,
    event: &Event,
    metrics: Option<&Metrics>,
) -> Result<bool> {
    let handled = if AvailableEventHandler::is_available_event(event) {
        AvailableEventHandler.handle(client, event).await?;
        true
    } else if is_task_event(event) {
        let namespace = event
            .involved_object
            .namespace
            .as_deref()
            .ok_or(Error::MissingObjectKey(".involvedObject.namespace"))?;
        let task_event = parse_task_event(event)?;
        handle_new_replica_task_event(client, namespace, &task_event).await?;
        true
    } else {
        false
    };

    if handled {
        if let Some(metrics) = metrics {
            metrics.record_agent_event(event.reason.as_deref().unwrap_or_default());
        }
    } else {
        debug!("not a kbagent event, ignored");
    }
    Ok(handled)
}
