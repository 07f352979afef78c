use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::capacity::{CapacityInfo, CapacityUpdate};
use crate::error::RemoteFailure;

/// Result of a single call against the remote encoding service
pub type RemoteResult<T> = std::result::Result<T, RemoteFailure>;

/// Remote job (and task) lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    Queued,
    Scheduled,
    Processing,
    Finished,
    Error,
    Canceled,
    Canceling,
}

impl JobState {
    pub const ALL: [JobState; 7] = [
        JobState::Queued,
        JobState::Scheduled,
        JobState::Processing,
        JobState::Finished,
        JobState::Error,
        JobState::Canceled,
        JobState::Canceling,
    ];

    /// Finished, Error and Canceled: resources must be released and nothing follows
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Finished | JobState::Error | JobState::Canceled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "Queued",
            JobState::Scheduled => "Scheduled",
            JobState::Processing => "Processing",
            JobState::Finished => "Finished",
            JobState::Error => "Error",
            JobState::Canceled => "Canceled",
            JobState::Canceling => "Canceling",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    /// Case-insensitive
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        JobState::ALL
            .iter()
            .copied()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| s.to_string())
    }
}

/// A freshly created input asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetHandle {
    pub id: String,
    /// Storage container backing the asset; files are copied or uploaded beneath it
    pub uri: Url,
}

/// First input or output asset of a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirstAssetRef {
    pub id: String,
    pub name: String,
}

/// First task of a job. Its name holds the encoded correlation data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRef {
    pub id: String,
    pub name: String,
}

/// Name and storage location of an asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLocation {
    pub name: String,
    pub uri: Url,
}

/// Point-in-time view of a remote job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    pub id: String,
    pub name: String,
    pub state: JobState,
    pub created: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// A registered callback address the remote service posts notifications to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackRegistration {
    pub id: String,
    pub name: String,
    pub endpoint: String,
}

impl CallbackRegistration {
    /// Name and address compared case-insensitively
    pub fn matches(&self, name: &str, endpoint: &Url) -> bool {
        self.name.eq_ignore_ascii_case(name) && self.endpoint.eq_ignore_ascii_case(endpoint.as_str())
    }
}

/// Asset the single task of a job writes into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputAssetSpec {
    pub name: String,
    /// Storage account; `None` lets the service pick its default account
    pub account: Option<String>,
}

/// Request to post notifications for the job's task to a registered callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationSubscription {
    pub endpoint_id: String,
    pub target_state: JobState,
    pub include_progress: bool,
}

impl NotificationSubscription {
    /// Notify up to Finished, with progress updates
    pub fn until_finished(endpoint_id: impl Into<String>) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            target_state: JobState::Finished,
            include_progress: true,
        }
    }
}

/// Everything the remote service needs to create a single-task encode job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub name: String,
    pub engine_id: String,
    pub input_asset_id: String,
    /// Resolved preset configuration
    pub configuration: String,
    pub output: OutputAssetSpec,
    /// Encoded correlation data, stored verbatim as the task name
    pub task_name: String,
    pub subscription: Option<NotificationSubscription>,
}

impl JobRequest {
    /// Task body document binding the job's input asset to the named output asset
    pub fn task_body(&self) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?><taskBody><inputAsset>JobInputAsset(0)</inputAsset>\
             <outputAsset assetName=\"{}\" storageAccountName=\"{}\" assetCreationOptions=\"0\" assetFormatOption=\"0\" >JobOutputAsset(0)</outputAsset></taskBody>",
            xml_escape(&self.output.name),
            xml_escape(self.output.account.as_deref().unwrap_or_default()),
        )
    }
}

fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Capability surface of the remote encoding service.
///
/// Implementations own transport, authentication and any deadlines; they are built once,
/// fully configured, before being handed to the orchestrator. Every method is a single
/// remote call and reports failures as a [`RemoteFailure`] describing that call.
#[async_trait]
pub trait RemoteJobClient: Send + Sync {
    /// Create an empty asset named `name`, optionally in a specific storage account
    async fn create_input_resource(&self, name: &str, account: Option<&str>) -> RemoteResult<AssetHandle>;

    /// Ask the service to enumerate the files now present in the asset's storage
    async fn finalize_file_listing(&self, resource_id: &str) -> RemoteResult<()>;

    /// Id of the latest processor called `engine_name`, if any
    async fn resolve_engine_id(&self, engine_name: &str) -> RemoteResult<Option<String>>;

    async fn submit_job(&self, request: &JobRequest) -> RemoteResult<String>;

    async fn get_job(&self, job_id: &str) -> RemoteResult<JobSnapshot>;

    async fn get_first_task(&self, job_id: &str) -> RemoteResult<Option<TaskRef>>;

    async fn get_first_input_asset(&self, job_id: &str) -> RemoteResult<Option<FirstAssetRef>>;

    async fn get_first_output_asset(&self, job_id: &str) -> RemoteResult<Option<FirstAssetRef>>;

    async fn get_resource_uri(&self, resource_id: &str) -> RemoteResult<AssetLocation>;

    async fn list_resource_file_names(&self, resource_id: &str) -> RemoteResult<Vec<String>>;

    async fn delete_resource(&self, resource_id: &str) -> RemoteResult<()>;

    async fn list_callback_registrations(&self) -> RemoteResult<Vec<CallbackRegistration>>;

    async fn create_callback_registration(&self, name: &str, endpoint: &Url) -> RemoteResult<String>;

    /// Reuse a registration with the same name and address, or create one.
    ///
    /// A failed listing is not fatal; creation is attempted anyway.
    async fn get_or_create_callback_registration(&self, name: &str, endpoint: &Url) -> RemoteResult<String> {
        match self.list_callback_registrations().await {
            Ok(existing) => {
                if let Some(found) = existing.into_iter().find(|r| r.matches(name, endpoint)) {
                    debug!("Reusing callback registration {} for {}", found.id, endpoint);
                    return Ok(found.id);
                }
            }
            Err(e) => warn!("Could not list callback registrations, creating a new one: {}", e),
        }

        self.create_callback_registration(name, endpoint).await
    }

    /// Reserved processing capacity of the account, if the service reports any
    async fn get_reserved_capacity(&self) -> RemoteResult<Option<CapacityInfo>>;

    async fn update_reserved_capacity(&self, update: &CapacityUpdate) -> RemoteResult<()>;
}
