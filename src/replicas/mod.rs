//! Replica task engine
//!
//! Tracks per-replica provisioning in an InstanceSet annotation
//! ([`status`]), keeps it in step with scaling ([`ops`]) and follows the
//! data tasks delegated to kbagent ([`task`]).

pub mod ops;
pub mod status;
pub mod task;

pub use ops::{ReplicaActions, scale_in, scale_out, sync_replicas_status};
pub use status::{
    REPLICAS_STATUS_ANNOTATION_KEY, ReplicaStatus, ReplicasStatus, build_replicas_status,
    delete_replicas_status, get_replicas_status, get_replicas_status_fn, new_replicas_status,
    status_replicas_status, update_replicas_status_fn,
};
pub use task::{
    NewReplicaTask, Task, TaskEvent, env_config_map_name, handle_new_replica_task_event,
    is_task_event, new_replica_task, parse_task_event,
};
