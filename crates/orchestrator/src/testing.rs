use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use url::Url;

use crate::capacity::{CapacityInfo, CapacityUpdate};
use crate::correlation::CorrelationData;
use crate::error::RemoteFailure;
use crate::location::{blob_uri_in, upload_blob_name};
use crate::remote::{
    AssetHandle, AssetLocation, CallbackRegistration, FirstAssetRef, JobRequest, JobSnapshot, JobState,
    RemoteJobClient, RemoteResult, TaskRef,
};
use crate::storage::{BlobStore, CopyInfo, PendingCopy, UploadInfo};

pub const ENGINE_ID: &str = "nb:mpid:UUID:mes";

#[derive(Debug, Clone)]
struct FakeAsset {
    name: String,
    uri: Url,
    files: Vec<String>,
}

#[derive(Debug, Clone)]
struct FakeJob {
    request: Option<JobRequest>,
    task_name: String,
    input_id: String,
    output_id: String,
    states: Vec<JobState>,
}

#[derive(Default)]
struct RemoteState {
    next_id: usize,
    assets: HashMap<String, FakeAsset>,
    jobs: HashMap<String, FakeJob>,
    registrations: Vec<CallbackRegistration>,
    capacity: Option<CapacityInfo>,
    capacity_updates: Vec<CapacityUpdate>,
    calls: Vec<String>,
    failing: HashSet<String>,
    no_engine: bool,
}

impl RemoteState {
    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }

    fn record(&mut self, call: String) {
        self.calls.push(call);
    }

    fn check(&self, operation: &str, target: &str) -> RemoteResult<()> {
        if self.failing.contains(operation) {
            return Err(RemoteFailure::new("POST", target, format!("{operation} rejected"))
                .with_status(500)
                .with_body("{\"error\":{\"code\":\"InternalError\"}}"));
        }
        Ok(())
    }

    fn job(&self, job_id: &str) -> RemoteResult<&FakeJob> {
        self.jobs
            .get(job_id)
            .ok_or_else(|| RemoteFailure::not_found("GET", format!("Jobs('{job_id}')")))
    }

    fn asset_ref(&self, id: &str) -> FirstAssetRef {
        let name = self.assets.get(id).map(|a| a.name.clone()).unwrap_or_default();
        FirstAssetRef { id: id.to_string(), name }
    }
}

/// Remote encoding service fake; every call is recorded as `operation:argument`
#[derive(Default)]
pub struct FakeRemote {
    state: Mutex<RemoteState>,
}

impl FakeRemote {
    /// Make every call of `operation` fail with a 500
    pub fn fail_operation(&self, operation: &str) {
        self.state.lock().unwrap().failing.insert(operation.to_string());
    }

    pub fn remove_engine(&self) {
        self.state.lock().unwrap().no_engine = true;
    }

    pub fn set_capacity(&self, capacity: Option<CapacityInfo>) {
        self.state.lock().unwrap().capacity = capacity;
    }

    pub fn capacity_updates(&self) -> Vec<CapacityUpdate> {
        self.state.lock().unwrap().capacity_updates.clone()
    }

    pub fn add_registration(&self, registration: CallbackRegistration) {
        self.state.lock().unwrap().registrations.push(registration);
    }

    pub fn registrations(&self) -> Vec<CallbackRegistration> {
        self.state.lock().unwrap().registrations.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls whose operation name is `operation`
    pub fn calls_to(&self, operation: &str) -> Vec<String> {
        let prefix = format!("{operation}:");
        self.calls().into_iter().filter(|c| c.starts_with(&prefix)).collect()
    }

    pub fn submitted(&self) -> Vec<JobRequest> {
        let state = self.state.lock().unwrap();
        let mut requests: Vec<_> = state.jobs.values().filter_map(|j| j.request.clone()).collect();
        requests.sort_by(|a, b| a.name.cmp(&b.name));
        requests
    }

    pub fn asset_exists(&self, asset_id: &str) -> bool {
        self.state.lock().unwrap().assets.contains_key(asset_id)
    }

    pub fn asset_ids(&self, job_id: &str) -> (String, String) {
        let state = self.state.lock().unwrap();
        let job = &state.jobs[job_id];
        (job.input_id.clone(), job.output_id.clone())
    }

    /// Replace the files the job's output asset holds
    pub fn set_output_files(&self, job_id: &str, files: &[&str]) {
        let mut state = self.state.lock().unwrap();
        let output_id = state.jobs[job_id].output_id.clone();
        if let Some(asset) = state.assets.get_mut(&output_id) {
            asset.files = files.iter().map(|f| f.to_string()).collect();
        }
    }

    /// States `get_job` reports on successive polls; the last one repeats
    pub fn set_job_states(&self, job_id: &str, states: &[JobState]) {
        let mut state = self.state.lock().unwrap();
        if let Some(job) = state.jobs.get_mut(job_id) {
            job.states = states.to_vec();
        }
    }

    /// Create a job with fresh input and output assets whose task name is `task_name`
    pub fn seed_job(&self, job_id: &str, task_name: &str) {
        let mut state = self.state.lock().unwrap();
        let input_id = state.next("nb:cid:UUID:in-");
        let output_id = state.next("nb:cid:UUID:out-");
        state.assets.insert(
            input_id.clone(),
            FakeAsset {
                name: "V2-acct-input-Input".to_string(),
                uri: asset_uri(&input_id),
                files: vec!["video.mp4".to_string()],
            },
        );
        state.assets.insert(
            output_id.clone(),
            FakeAsset {
                name: "V2-acct-input-Output".to_string(),
                uri: asset_uri(&output_id),
                files: vec!["video_1280x720.mp4".to_string()],
            },
        );
        state.jobs.insert(
            job_id.to_string(),
            FakeJob {
                request: None,
                task_name: task_name.to_string(),
                input_id,
                output_id,
                states: vec![JobState::Queued],
            },
        );
    }

    /// [`seed_job`](Self::seed_job) with encoded correlation data as the task name
    pub fn seed_job_with(&self, job_id: &str, correlation: &CorrelationData) {
        self.seed_job(job_id, &correlation.encode().unwrap());
    }
}

fn asset_uri(asset_id: &str) -> Url {
    let container = asset_id.rsplit(':').next().unwrap_or(asset_id);
    Url::parse(&format!("https://media.blob.core.windows.net/asset-{container}")).unwrap()
}

#[async_trait]
impl RemoteJobClient for FakeRemote {
    async fn create_input_resource(&self, name: &str, account: Option<&str>) -> RemoteResult<AssetHandle> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("create_input_resource:{name}@{}", account.unwrap_or_default()));
        state.check("create_input_resource", "Assets")?;
        let id = state.next("nb:cid:UUID:in-");
        let uri = asset_uri(&id);
        state.assets.insert(
            id.clone(),
            FakeAsset {
                name: name.to_string(),
                uri: uri.clone(),
                files: Vec::new(),
            },
        );
        Ok(AssetHandle { id, uri })
    }

    async fn finalize_file_listing(&self, resource_id: &str) -> RemoteResult<()> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("finalize_file_listing:{resource_id}"));
        state.check("finalize_file_listing", "CreateFileInfos")
    }

    async fn resolve_engine_id(&self, engine_name: &str) -> RemoteResult<Option<String>> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("resolve_engine_id:{engine_name}"));
        state.check("resolve_engine_id", "MediaProcessors")?;
        if state.no_engine {
            return Ok(None);
        }
        Ok(Some(ENGINE_ID.to_string()))
    }

    async fn submit_job(&self, request: &JobRequest) -> RemoteResult<String> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("submit_job:{}", request.name));
        state.check("submit_job", "Jobs")?;
        let job_id = state.next("nb:jid:UUID:");
        let output_id = state.next("nb:cid:UUID:out-");
        state.assets.insert(
            output_id.clone(),
            FakeAsset {
                name: request.output.name.clone(),
                uri: asset_uri(&output_id),
                files: vec!["video_1280x720.mp4".to_string()],
            },
        );
        state.jobs.insert(
            job_id.clone(),
            FakeJob {
                request: Some(request.clone()),
                task_name: request.task_name.clone(),
                input_id: request.input_asset_id.clone(),
                output_id,
                states: vec![JobState::Queued],
            },
        );
        Ok(job_id)
    }

    async fn get_job(&self, job_id: &str) -> RemoteResult<JobSnapshot> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("get_job:{job_id}"));
        state.check("get_job", job_id)?;
        let job = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| RemoteFailure::not_found("GET", format!("Jobs('{job_id}')")))?;
        let current = if job.states.len() > 1 {
            job.states.remove(0)
        } else {
            job.states.first().copied().unwrap_or(JobState::Queued)
        };
        let name = job.request.as_ref().map(|r| r.name.clone()).unwrap_or_default();
        Ok(JobSnapshot {
            id: job_id.to_string(),
            name,
            state: current,
            created: None,
            last_modified: None,
            end_time: None,
        })
    }

    async fn get_first_task(&self, job_id: &str) -> RemoteResult<Option<TaskRef>> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("get_first_task:{job_id}"));
        state.check("get_first_task", job_id)?;
        let job = state.job(job_id)?;
        Ok(Some(TaskRef {
            id: format!("{job_id}-task-0"),
            name: job.task_name.clone(),
        }))
    }

    async fn get_first_input_asset(&self, job_id: &str) -> RemoteResult<Option<FirstAssetRef>> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("get_first_input_asset:{job_id}"));
        state.check("get_first_input_asset", job_id)?;
        let id = state.job(job_id)?.input_id.clone();
        Ok(Some(state.asset_ref(&id)))
    }

    async fn get_first_output_asset(&self, job_id: &str) -> RemoteResult<Option<FirstAssetRef>> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("get_first_output_asset:{job_id}"));
        state.check("get_first_output_asset", job_id)?;
        let id = state.job(job_id)?.output_id.clone();
        Ok(Some(state.asset_ref(&id)))
    }

    async fn get_resource_uri(&self, resource_id: &str) -> RemoteResult<AssetLocation> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("get_resource_uri:{resource_id}"));
        state.check("get_resource_uri", resource_id)?;
        let asset = state
            .assets
            .get(resource_id)
            .ok_or_else(|| RemoteFailure::not_found("GET", format!("Assets('{resource_id}')")))?;
        Ok(AssetLocation {
            name: asset.name.clone(),
            uri: asset.uri.clone(),
        })
    }

    async fn list_resource_file_names(&self, resource_id: &str) -> RemoteResult<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("list_resource_file_names:{resource_id}"));
        state.check("list_resource_file_names", resource_id)?;
        let asset = state
            .assets
            .get(resource_id)
            .ok_or_else(|| RemoteFailure::not_found("GET", format!("Assets('{resource_id}')/Files")))?;
        Ok(asset.files.clone())
    }

    async fn delete_resource(&self, resource_id: &str) -> RemoteResult<()> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("delete_resource:{resource_id}"));
        state.check("delete_resource", resource_id)?;
        state
            .assets
            .remove(resource_id)
            .map(|_| ())
            .ok_or_else(|| RemoteFailure::not_found("DELETE", format!("Assets('{resource_id}')")))
    }

    async fn list_callback_registrations(&self) -> RemoteResult<Vec<CallbackRegistration>> {
        let mut state = self.state.lock().unwrap();
        state.record("list_callback_registrations:".to_string());
        state.check("list_callback_registrations", "NotificationEndPoints")?;
        Ok(state.registrations.clone())
    }

    async fn create_callback_registration(&self, name: &str, endpoint: &Url) -> RemoteResult<String> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("create_callback_registration:{name}"));
        state.check("create_callback_registration", "NotificationEndPoints")?;
        let id = state.next("nb:nepid:UUID:");
        state.registrations.push(CallbackRegistration {
            id: id.clone(),
            name: name.to_string(),
            endpoint: endpoint.to_string(),
        });
        Ok(id)
    }

    async fn get_reserved_capacity(&self) -> RemoteResult<Option<CapacityInfo>> {
        let mut state = self.state.lock().unwrap();
        state.record("get_reserved_capacity:".to_string());
        state.check("get_reserved_capacity", "EncodingReservedUnitTypes")?;
        Ok(state.capacity.clone())
    }

    async fn update_reserved_capacity(&self, update: &CapacityUpdate) -> RemoteResult<()> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("update_reserved_capacity:{}", update.units));
        state.check("update_reserved_capacity", "EncodingReservedUnitTypes")?;
        state.capacity_updates.push(update.clone());
        if let Some(capacity) = state.capacity.as_mut() {
            capacity.unit_type = Some(update.unit_type);
            capacity.current_units = Some(update.units);
        }
        Ok(())
    }
}

#[derive(Default)]
struct BlobState {
    copies: Vec<(Url, Url)>,
    uploads: Vec<(String, Url)>,
    missing: HashSet<String>,
    failing_sources: HashSet<String>,
    exists_checks: usize,
}

/// Storage fake recording copies and uploads
#[derive(Default)]
pub struct FakeBlobs {
    state: Mutex<BlobState>,
}

impl FakeBlobs {
    /// Report `uri` as absent from `exists`
    pub fn mark_missing(&self, uri: &str) {
        self.state.lock().unwrap().missing.insert(uri.to_string());
    }

    /// Fail copies from `source` once they are waited on
    pub fn fail_copy_from(&self, source: &str) {
        self.state.lock().unwrap().failing_sources.insert(source.to_string());
    }

    pub fn copies(&self) -> Vec<(Url, Url)> {
        self.state.lock().unwrap().copies.clone()
    }

    pub fn uploads(&self) -> Vec<(String, Url)> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub fn exists_checks(&self) -> usize {
        self.state.lock().unwrap().exists_checks
    }
}

struct FakeCopy {
    destination: Url,
    failure: Option<RemoteFailure>,
}

#[async_trait]
impl PendingCopy for FakeCopy {
    async fn wait_for_completion(self: Box<Self>) -> RemoteResult<CopyInfo> {
        match self.failure {
            Some(failure) => Err(failure),
            None => Ok(CopyInfo {
                destination: self.destination,
                bytes_copied: Some(1024),
            }),
        }
    }
}

#[async_trait]
impl BlobStore for FakeBlobs {
    async fn exists(&self, uri: &Url) -> RemoteResult<bool> {
        let mut state = self.state.lock().unwrap();
        state.exists_checks += 1;
        Ok(!state.missing.contains(uri.as_str()))
    }

    async fn start_copy(&self, source: &Url, destination: &Url) -> RemoteResult<Box<dyn PendingCopy>> {
        let mut state = self.state.lock().unwrap();
        let failure = state
            .failing_sources
            .contains(source.as_str())
            .then(|| RemoteFailure::new("COPY", source.as_str(), "copy failed").with_status(409));
        if failure.is_none() {
            state.copies.push((source.clone(), destination.clone()));
        }
        Ok(Box::new(FakeCopy {
            destination: destination.clone(),
            failure,
        }))
    }

    async fn upload_file(&self, path: &Path, destination: &Url) -> RemoteResult<UploadInfo> {
        let name = upload_blob_name(path).map_err(|e| RemoteFailure::new("PUT", destination.as_str(), e.to_string()))?;
        let uri = blob_uri_in(destination, &name).map_err(|e| RemoteFailure::new("PUT", destination.as_str(), e.to_string()))?;
        let mut state = self.state.lock().unwrap();
        state.uploads.push((path.display().to_string(), uri.clone()));
        Ok(UploadInfo {
            destination: uri,
            etag: Some("\"0x8D\"".to_string()),
            last_modified: None,
        })
    }
}
