//! New-replica tasks delegated to kbagent
//!
//! When a component scales out and declares data actions, an existing
//! replica is asked to stream its data to the new ones. The task is handed
//! to kbagent through the component env ConfigMap; kbagent reports progress
//! back as Events, which update the task store and the replica status.

use std::collections::BTreeMap;
use std::future::Future;

use jiff::Timestamp;
use k8s_openapi::api::core::v1::{ConfigMap, Event, Pod};
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::status::update_replicas_status_fn;
use crate::client::{Writer, replace_typed};
use crate::component::pod_fqdn;
use crate::controller::error::{Error, Result};
use crate::crd::InstanceSet;
use crate::resources::common::{
    KBAGENT_CONTAINER_NAME, KBAGENT_FIELD_PATH, KBAGENT_REPORTING_CONTROLLER,
};

/// Env key holding the JSON encoded task list
pub const KB_AGENT_TASK_ENV: &str = "KB_AGENT_TASK";

pub const NEW_REPLICA_TASK: &str = "newReplica";

pub const STREAMING_PORT_NAME: &str = "streaming";
pub const DEFAULT_STREAMING_PORT: i32 = 3502;

pub const REPORT_PERIOD_SECONDS: i32 = 60;

/// Attempts of a read-modify-write before a conflict is returned
pub const MAX_CONFLICT_RETRIES: usize = 3;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Full component name
    pub instance: String,
    pub task: String,
    pub uid: String,
    /// Comma separated target replicas still pending
    pub replicas: String,
    #[serde(default)]
    pub notify_at_finish: bool,
    #[serde(default)]
    pub report_period_seconds: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_replica: Option<NewReplicaTask>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewReplicaTask {
    /// Host of the replica streaming the data
    pub remote: String,
    pub port: i32,
    pub replicas: String,
}

/// Progress report of a task for one replica
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskEvent {
    pub instance: String,
    pub task: String,
    pub uid: String,
    pub replica: String,
    pub start_time: Timestamp,
    /// Absent while the task is still running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<Timestamp>,
    #[serde(default)]
    pub code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TaskEvent {
    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }
}

/// Name of the ConfigMap carrying the component env
pub fn env_config_map_name(full_comp_name: &str) -> String {
    format!("{full_comp_name}-env")
}

/// Streaming port exposed by the kbagent container of `pod`
pub fn streaming_port(pod: &Pod) -> i32 {
    pod.spec
        .iter()
        .flat_map(|s| s.containers.iter())
        .filter(|c| c.name == KBAGENT_CONTAINER_NAME)
        .flat_map(|c| c.ports.iter().flatten())
        .find(|p| p.name.as_deref() == Some(STREAMING_PORT_NAME))
        .map(|p| p.container_port)
        .unwrap_or(DEFAULT_STREAMING_PORT)
}

/// Env parameters asking `source` to stream its data to `replicas`
pub fn new_replica_task(
    comp_full_name: &str,
    uid: &str,
    source: &Pod,
    replicas: &[String],
) -> Result<BTreeMap<String, String>> {
    let namespace = source
        .namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let targets = replicas.join(",");
    let task = Task {
        instance: comp_full_name.to_string(),
        task: NEW_REPLICA_TASK.to_string(),
        uid: uid.to_string(),
        replicas: targets.clone(),
        notify_at_finish: true,
        report_period_seconds: REPORT_PERIOD_SECONDS,
        new_replica: Some(NewReplicaTask {
            remote: pod_fqdn(&namespace, comp_full_name, &source.name_any()),
            port: streaming_port(source),
            replicas: targets,
        }),
    };
    Ok(BTreeMap::from([(
        KB_AGENT_TASK_ENV.to_string(),
        serde_json::to_string(&vec![task])?,
    )]))
}

/// Drop `replica` from the matching task; tasks left without replicas go away
pub fn remove_task_replica(tasks: &mut Vec<Task>, uid: &str, replica: &str) {
    let strip = |list: &str| -> String {
        list.split(',')
            .filter(|r| !r.is_empty() && *r != replica)
            .collect::<Vec<_>>()
            .join(",")
    };
    for task in tasks.iter_mut().filter(|t| t.uid == uid && t.task == NEW_REPLICA_TASK) {
        task.replicas = strip(&task.replicas);
        if let Some(new_replica) = task.new_replica.as_mut() {
            new_replica.replicas = strip(&new_replica.replicas);
        }
    }
    tasks.retain(|t| !(t.uid == uid && t.task == NEW_REPLICA_TASK && t.replicas.is_empty()));
}

/// Run `op` again while it fails with a write conflict, up to
/// [`MAX_CONFLICT_RETRIES`] attempts
pub async fn retry_on_conflict<F, Fut>(what: &str, mut op: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_conflict() && attempt < MAX_CONFLICT_RETRIES => {
                warn!(object = %what, attempt, "conflict, retrying: {}", e);
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Apply a kbagent task event to the task store and the replica status
pub async fn handle_new_replica_task_event<W: Writer>(
    client: &W,
    namespace: &str,
    event: &TaskEvent,
) -> Result<()> {
    if event.task != NEW_REPLICA_TASK {
        debug!(task = %event.task, "not a new replica task, ignored");
        return Ok(());
    }

    let succeeded = event.is_finished() && event.code == 0;
    if succeeded {
        retry_on_conflict(&env_config_map_name(&event.instance), || {
            update_task_store(client, namespace, event)
        })
        .await?;
    }

    retry_on_conflict(&event.instance, || {
        update_replica_status(client, namespace, event)
    })
    .await?;

    info!(
        replica = %event.replica,
        finished = event.is_finished(),
        code = event.code,
        "new replica task event handled"
    );
    Ok(())
}

async fn update_task_store<W: Writer>(client: &W, namespace: &str, event: &TaskEvent) -> Result<()> {
    let name = env_config_map_name(&event.instance);
    let Some(mut cm) = client.get::<ConfigMap>(namespace, &name).await? else {
        debug!(config_map = %name, "env config map not found, task store skipped");
        return Ok(());
    };
    let data = cm.data.get_or_insert_with(BTreeMap::new);
    let Some(raw) = data.get(KB_AGENT_TASK_ENV) else {
        return Ok(());
    };
    let mut tasks: Vec<Task> = serde_json::from_str(raw)?;
    remove_task_replica(&mut tasks, &event.uid, &event.replica);
    if tasks.is_empty() {
        data.remove(KB_AGENT_TASK_ENV);
    } else {
        data.insert(KB_AGENT_TASK_ENV.to_string(), serde_json::to_string(&tasks)?);
    }
    replace_typed(client, &cm).await?;
    Ok(())
}

async fn update_replica_status<W: Writer>(
    client: &W,
    namespace: &str,
    event: &TaskEvent,
) -> Result<()> {
    let Some(mut its) = client.get::<InstanceSet>(namespace, &event.instance).await? else {
        return Err(Error::NotFound(format!("instance set {}", event.instance)));
    };
    let message = event
        .message
        .clone()
        .or_else(|| event.output.clone())
        .filter(|m| !m.is_empty());

    let mut tracked = true;
    update_replicas_status_fn(&mut its, |status| {
        let Some(replica) = status.find_mut(&event.replica) else {
            tracked = false;
            return Ok(());
        };
        match (event.is_finished(), event.code == 0) {
            (true, true) => {
                replica.provisioned = true;
                replica.data_loaded = Some(true);
                replica.message = None;
            }
            (true, false) => {
                replica.provisioned = true;
                replica.message = message;
            }
            (false, _) => {
                replica.provisioned = true;
                replica.data_loaded = Some(false);
                replica.message = message;
            }
        }
        Ok(())
    })?;

    if !tracked {
        debug!(replica = %event.replica, "replica not tracked, status unchanged");
        return Ok(());
    }
    replace_typed(client, &its).await?;
    Ok(())
}

/// Whether a kubernetes Event carries a kbagent task report
pub fn is_task_event(event: &Event) -> bool {
    event.reporting_component.as_deref() == Some(KBAGENT_REPORTING_CONTROLLER)
        && event.reason.as_deref() == Some(NEW_REPLICA_TASK)
        && event.involved_object.field_path.as_deref() == Some(KBAGENT_FIELD_PATH)
}

/// Decode the task report carried by an Event message
pub fn parse_task_event(event: &Event) -> Result<TaskEvent> {
    Ok(serde_json::from_str(
        event.message.as_deref().unwrap_or_default(),
    )?)
}
