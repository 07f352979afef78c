use std::time::Duration;

use log::{debug, error, info};

use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, Result};
use crate::remote::{JobSnapshot, JobState, RemoteJobClient};

/// Poll `job_id` every `interval` until it reaches a terminal state.
///
/// For deployments without a reachable callback endpoint. Returns the terminal snapshot;
/// the caller decides what to do with Finished/Error/Canceled.
pub async fn wait_for_terminal_state(
    client: &dyn RemoteJobClient,
    job_id: &str,
    interval: Duration,
) -> Result<JobSnapshot> {
    let mut last_state: Option<JobState> = None;

    loop {
        let snapshot = client.get_job(job_id).await.map_err(|e| {
            error!("Could not poll job {}: {}", job_id, e);
            OrchestratorError::remote(format!("polling job {job_id}"), e)
        })?;

        if last_state != Some(snapshot.state) {
            info!("Job {} is {}", job_id, snapshot.state);
            last_state = Some(snapshot.state);
        }

        if snapshot.state.is_terminal() {
            return Ok(snapshot);
        }

        debug!("Job {} not terminal yet, next poll in {:?}", job_id, interval);
        tokio::time::sleep(interval).await;
    }
}

/// [`wait_for_terminal_state`] at the configured poll interval
pub async fn wait_for_job(client: &dyn RemoteJobClient, job_id: &str, config: &OrchestratorConfig) -> Result<JobSnapshot> {
    wait_for_terminal_state(client, job_id, config.poll_interval()).await
}
