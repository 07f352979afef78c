use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::correlation::{CorrelationData, OPERATION_CONTEXT_KEY, OUTPUT_CONTAINER_KEY};
use crate::error::{OrchestratorError, Result};
use crate::location::blob_uri_in;
use crate::remote::{FirstAssetRef, JobState, RemoteJobClient};
use crate::storage::BlobStore;

pub const JOB_ID_PROPERTY: &str = "jobId";
pub const NEW_STATE_PROPERTY: &str = "newState";
pub const PROGRESS_PROPERTY: &str = "lastComputedProgress";

/// Event types the remote service posts to a callback endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationEventType {
    None,
    JobStateChange,
    NotificationEndPointRegistration,
    NotificationEndPointUnregistration,
    TaskStateChange,
    TaskProgress,
    /// Anything else, kept by name
    Other(String),
}

impl NotificationEventType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::None => "None",
            Self::JobStateChange => "JobStateChange",
            Self::NotificationEndPointRegistration => "NotificationEndPointRegistration",
            Self::NotificationEndPointUnregistration => "NotificationEndPointUnregistration",
            Self::TaskStateChange => "TaskStateChange",
            Self::TaskProgress => "TaskProgress",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for NotificationEventType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "None" => Self::None,
            "JobStateChange" => Self::JobStateChange,
            "NotificationEndPointRegistration" => Self::NotificationEndPointRegistration,
            "NotificationEndPointUnregistration" => Self::NotificationEndPointUnregistration,
            "TaskStateChange" => Self::TaskStateChange,
            "TaskProgress" => Self::TaskProgress,
            _ => Self::Other(raw),
        }
    }
}

impl From<NotificationEventType> for String {
    fn from(event_type: NotificationEventType) -> Self {
        event_type.as_str().to_string()
    }
}

impl fmt::Display for NotificationEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded webhook notification; consumed once, never stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMessage {
    #[serde(alias = "EventType")]
    pub event_type: NotificationEventType,
    #[serde(alias = "Properties", default)]
    pub properties: HashMap<String, String>,
    #[serde(alias = "MessageVersion", default, skip_serializing_if = "Option::is_none")]
    pub message_version: Option<String>,
    #[serde(alias = "ETag", default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(alias = "TimeStamp", default, skip_serializing_if = "Option::is_none")]
    pub time_stamp: Option<String>,
}

impl NotificationMessage {
    pub fn new(event_type: NotificationEventType) -> Self {
        Self {
            event_type,
            properties: HashMap::new(),
            message_version: None,
            etag: None,
            time_stamp: None,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Parse a webhook body. An empty or `null` body means no message at all.
    pub fn from_json(body: &str) -> Result<Self> {
        let message: Option<Self> = serde_json::from_str(body)
            .map_err(|e| OrchestratorError::validation(format!("notification body is not a notification message: {e}")))?;
        message.ok_or_else(|| OrchestratorError::validation("notification message is absent"))
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// What a notification means for the job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Progress report, in percent
    Progress(i32),
    /// Scheduled or Processing, as received
    InFlight(String),
    Finished,
    Failed,
    Canceled,
}

impl Transition {
    /// Whether handling this transition releases the job's assets
    pub fn releases_assets(&self) -> bool {
        matches!(self, Transition::Finished | Transition::Failed | Transition::Canceled)
    }

    /// Side effects the processor performs for this transition
    pub fn planned_action(&self) -> &'static str {
        match self {
            Transition::Progress(_) | Transition::InFlight(_) => "none",
            Transition::Finished => "copy output files to the output container, then delete input and output assets",
            Transition::Failed => "delete input and output assets, then report the job failure",
            Transition::Canceled => "delete input and output assets",
        }
    }
}

/// A notification validated and mapped to its transition, before any remote call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedNotification {
    pub job_id: String,
    pub transition: Transition,
}

/// Validate `message` and decide what it means; performs no I/O
pub fn classify(message: &NotificationMessage) -> Result<ClassifiedNotification> {
    let job_id = message
        .property(JOB_ID_PROPERTY)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| OrchestratorError::validation("notification message has no jobId"))?
        .to_string();

    let transition = match &message.event_type {
        NotificationEventType::TaskStateChange => {
            let new_state = message
                .property(NEW_STATE_PROPERTY)
                .ok_or_else(|| OrchestratorError::protocol(format!("TaskStateChange for {job_id} has no newState")))?;

            match new_state.parse::<JobState>() {
                Ok(JobState::Scheduled) | Ok(JobState::Processing) => Transition::InFlight(new_state.to_string()),
                Ok(JobState::Finished) => Transition::Finished,
                Ok(JobState::Error) => Transition::Failed,
                Ok(JobState::Canceled) => Transition::Canceled,
                Ok(_) | Err(_) => return Err(OrchestratorError::UnsupportedState(new_state.to_string())),
            }
        }
        NotificationEventType::TaskProgress => {
            let raw = message
                .property(PROGRESS_PROPERTY)
                .ok_or_else(|| OrchestratorError::protocol(format!("TaskProgress for {job_id} has no lastComputedProgress")))?;
            let progress = raw.trim().parse::<i32>().map_err(|_| {
                OrchestratorError::protocol(format!("TaskProgress for {job_id} has unparseable progress {raw:?}"))
            })?;
            Transition::Progress(progress)
        }
        other => return Err(OrchestratorError::UnsupportedEvent(other.to_string())),
    };

    Ok(ClassifiedNotification { job_id, transition })
}

/// Result of handling one notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationOutcome {
    pub job_id: String,
    /// `Progress:{n}`, the in-flight state as received, `Finished` or `Canceled`
    pub status: String,
    /// Destination URIs of copied outputs; only filled on Finished
    pub copied: Vec<Url>,
}

/// Drives cleanup and result delivery from job notifications.
///
/// Holds no state between calls: everything is read back from the remote service using
/// the job id. Notifications for one job are expected one at a time.
pub struct NotificationProcessor {
    client: Arc<dyn RemoteJobClient>,
    blobs: Arc<dyn BlobStore>,
}

impl NotificationProcessor {
    pub fn new(client: Arc<dyn RemoteJobClient>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { client, blobs }
    }

    /// Handle one notification, returning the job id and the resulting status.
    ///
    /// Error notifications release the job's assets and then fail with `JobFailed`.
    pub async fn handle_notification(&self, message: &NotificationMessage) -> Result<NotificationOutcome> {
        let ClassifiedNotification { job_id, transition } = classify(message).map_err(|e| {
            warn!("Rejected {} notification: {}", message.event_type, e);
            e
        })?;

        let outcome = |status: String, copied: Vec<Url>| NotificationOutcome {
            job_id: job_id.clone(),
            status,
            copied,
        };

        match transition {
            Transition::Progress(progress) => {
                debug!("Job {} progress {}", job_id, progress);
                Ok(outcome(format!("Progress:{progress}"), Vec::new()))
            }
            Transition::InFlight(state) => {
                info!("Job {} is {}", job_id, state);
                Ok(outcome(state, Vec::new()))
            }
            Transition::Finished => {
                let copied = self.copy_output_to_container(&job_id).await?;
                self.delete_assets_for_job(&job_id).await?;
                info!("Job {} finished, {} output file(s) delivered", job_id, copied.len());
                Ok(outcome(JobState::Finished.to_string(), copied))
            }
            Transition::Failed => {
                let cleanup = self.delete_assets_for_job(&job_id).await.err().map(Box::new);
                error!("Job {} reported Error", job_id);
                Err(OrchestratorError::JobFailed {
                    job_id: job_id.clone(),
                    cleanup,
                })
            }
            Transition::Canceled => {
                self.delete_assets_for_job(&job_id).await?;
                info!("Job {} canceled, assets released", job_id);
                Ok(outcome(JobState::Canceled.to_string(), Vec::new()))
            }
        }
    }

    /// Decode the correlation data stored in the job's first task name
    pub async fn correlation_data_for_job(&self, job_id: &str) -> Result<CorrelationData> {
        let task = self
            .client
            .get_first_task(job_id)
            .await
            .map_err(|e| {
                error!("Could not read first task of {}: {}", job_id, e);
                OrchestratorError::remote(format!("reading correlation data of {job_id}"), e)
            })?
            .ok_or_else(|| OrchestratorError::not_found("task", job_id))?;

        CorrelationData::decode(&task.name).map_err(|e| {
            error!("Task {} of {} does not carry correlation data: {}", task.id, job_id, e);
            OrchestratorError::remote(format!("decoding correlation data of {job_id}"), e)
        })
    }

    /// The operation context the job was submitted with
    pub async fn operation_context_for_job(&self, job_id: &str) -> Result<serde_json::Value> {
        let correlation = self.correlation_data_for_job(job_id).await?;
        let raw = correlation.operation_context().ok_or_else(|| {
            error!("Could not get operationContext for {}", job_id);
            OrchestratorError::not_found("correlation entry", format!("{OPERATION_CONTEXT_KEY} of {job_id}"))
        })?;

        serde_json::from_str(raw)
            .map_err(|e| OrchestratorError::protocol(format!("operationContext of {job_id} is not JSON: {e}")))
    }

    /// Copy every file of the job's first output asset into the container named in its
    /// correlation data, returning the destination URIs
    pub async fn copy_output_to_container(&self, job_id: &str) -> Result<Vec<Url>> {
        let correlation = self.correlation_data_for_job(job_id).await?;
        let raw_container = correlation.output_container().ok_or_else(|| {
            error!("Expected {} in correlation data of {}", OUTPUT_CONTAINER_KEY, job_id);
            OrchestratorError::not_found("correlation entry", format!("{OUTPUT_CONTAINER_KEY} of {job_id}"))
        })?;
        let container = Url::parse(raw_container).map_err(|e| {
            OrchestratorError::validation(format!("{OUTPUT_CONTAINER_KEY} of {job_id} is not a URI: {e}"))
        })?;

        let output = self.first_output_asset(job_id).await?;
        let location = self.client.get_resource_uri(&output.id).await.map_err(|e| {
            error!("Could not locate output asset {} of {}: {}", output.id, job_id, e);
            OrchestratorError::remote(format!("locating output asset {} of {job_id}", output.id), e)
        })?;
        let file_names = self.client.list_resource_file_names(&output.id).await.map_err(|e| {
            error!("Could not list files of output asset {} of {}: {}", output.id, job_id, e);
            OrchestratorError::remote(format!("listing files of output asset {} of {job_id}", output.id), e)
        })?;

        let mut copied = Vec::with_capacity(file_names.len());
        for file_name in &file_names {
            let source = blob_uri_in(&location.uri, file_name)?;
            let destination = blob_uri_in(&container, file_name)?;

            let started = Instant::now();
            self.blobs.copy_by_uri(&source, &destination).await.map_err(|e| {
                error!("Failed to copy {} to {} for {}: {}", file_name, container, job_id, e);
                OrchestratorError::remote(format!("copying {file_name} to {container} for {job_id}"), e)
            })?;
            info!("Copied {} to {} in {} ms", file_name, destination, started.elapsed().as_millis());

            copied.push(destination);
        }

        info!("Copied output asset {} to {} for {}", output.id, container, job_id);
        Ok(copied)
    }

    /// Delete the job's first input and first output assets.
    ///
    /// Not idempotent from the caller's view: once the assets are gone, a repeat call fails
    /// with `Remote` (not found) like any other remote failure.
    pub async fn delete_assets_for_job(&self, job_id: &str) -> Result<()> {
        let input = self
            .client
            .get_first_input_asset(job_id)
            .await
            .map_err(|e| {
                error!("Could not read input asset of {}: {}", job_id, e);
                OrchestratorError::remote(format!("reading input asset of {job_id}"), e)
            })?
            .ok_or_else(|| OrchestratorError::not_found("input asset", job_id))?;
        let output = self.first_output_asset(job_id).await?;

        for (role, asset) in [("input", &input), ("output", &output)] {
            self.client.delete_resource(&asset.id).await.map_err(|e| {
                error!("Could not delete {} asset {} of {}: {}", role, asset.id, job_id, e);
                OrchestratorError::remote(format!("deleting {role} asset {} of {job_id}", asset.id), e)
            })?;
            debug!("Deleted {} asset {} ({}) of {}", role, asset.id, asset.name, job_id);
        }

        info!("Deleted assets of {}", job_id);
        Ok(())
    }

    async fn first_output_asset(&self, job_id: &str) -> Result<FirstAssetRef> {
        self.client
            .get_first_output_asset(job_id)
            .await
            .map_err(|e| {
                error!("Could not read output asset of {}: {}", job_id, e);
                OrchestratorError::remote(format!("reading output asset of {job_id}"), e)
            })?
            .ok_or_else(|| OrchestratorError::not_found("output asset", job_id))
    }
}
