use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::Job;
use tracing::debug;

use crate::client::Reader;
use crate::controller::error::{Error, Result};
use crate::graph::{Dag, GraphClient};
use crate::resources::job::CLEANUP_TTL_SECONDS;

/// Observed execution state of a Job
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    Complete,
    Failed,
    /// Not finished yet, or no terminal condition observed
    Running,
}

pub fn job_state(job: &Job) -> JobState {
    let conditions = job
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(Vec::as_slice)
        .unwrap_or_default();
    for condition in conditions.iter().filter(|c| c.status == "True") {
        match condition.type_.as_str() {
            "Complete" => return JobState::Complete,
            "Failed" => return JobState::Failed,
            _ => {}
        }
    }
    JobState::Running
}

pub async fn job_exists<R: Reader>(reader: &R, namespace: &str, name: &str) -> Result<bool> {
    Ok(reader.get::<Job>(namespace, name).await?.is_some())
}

/// Ok once the Job completed.
///
/// A missing Job is `NotFound`, a failed one `JobFailed`, and one still
/// running `ExpectedInProcess`.
pub async fn check_job_succeed<R: Reader>(reader: &R, namespace: &str, name: &str) -> Result<()> {
    let Some(job) = reader.get::<Job>(namespace, name).await? else {
        return Err(Error::NotFound("job not exist, pls check.".to_string()));
    };
    match job_state(&job) {
        JobState::Complete => Ok(()),
        JobState::Failed => Err(Error::JobFailed("job failed, pls check.".to_string())),
        JobState::Running => Err(Error::ExpectedInProcess(format!(
            "requeue to waiting for job {name} finished."
        ))),
    }
}

/// Stage a TTL patch so the Job is garbage collected shortly after finishing
pub fn clean_job_with_dag(graph: &GraphClient, dag: &mut Dag, job: &Job) -> Result<usize> {
    let mut modified = job.clone();
    modified
        .spec
        .get_or_insert_with(Default::default)
        .ttl_seconds_after_finished = Some(CLEANUP_TTL_SECONDS);
    debug!(job = %job.metadata.name.as_deref().unwrap_or_default(), "scheduling job cleanup");
    graph.patch(dag, job, &modified)
}

/// Stage cleanup of every Job carrying `labels`
pub async fn clean_jobs_with_labels<R: Reader>(
    reader: &R,
    graph: &GraphClient,
    dag: &mut Dag,
    namespace: &str,
    labels: &BTreeMap<String, String>,
) -> Result<Vec<usize>> {
    let jobs: Vec<Job> = reader.list(namespace, labels).await?;
    jobs.iter()
        .map(|job| clean_job_with_dag(graph, dag, job))
        .collect()
}
