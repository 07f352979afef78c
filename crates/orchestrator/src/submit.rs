use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info, warn};
use url::Url;

use crate::config::OrchestratorConfig;
use crate::correlation::{CorrelationData, OPERATION_CONTEXT_KEY, OUTPUT_CONTAINER_KEY};
use crate::error::{OrchestratorError, Result};
use crate::location::{blob_uri_in, SourceLocation};
use crate::naming;
use crate::preset::PresetResolver;
use crate::remote::{AssetHandle, JobRequest, NotificationSubscription, OutputAssetSpec, RemoteJobClient};
use crate::storage::BlobStore;

/// What to encode and where the results go
#[derive(Debug, Clone, Default)]
pub struct EncodeRequest {
    /// Inputs, in order; all land in one input asset named after the first
    pub inputs: Vec<SourceLocation>,
    pub preset_name: String,
    /// Storage account the output asset is created in
    pub output_account: Option<String>,
    /// Container finished outputs are copied into; falls back to the configured default, then
    /// to a `{container}-output` sibling of the first blob input
    pub output_container: Option<Url>,
    /// Callback endpoint for notifications; falls back to the configured one
    pub callback_endpoint: Option<Url>,
    /// Opaque caller state returned with every notification lookup
    pub operation_context: Option<serde_json::Value>,
}

impl EncodeRequest {
    pub fn new(inputs: Vec<SourceLocation>, preset_name: impl Into<String>) -> Self {
        Self {
            inputs,
            preset_name: preset_name.into(),
            ..Self::default()
        }
    }
}

/// Creates the input asset, fills it, and submits a single-task encode job.
///
/// Performs no retries; any failed remote call ends the submission. An input asset created
/// before a later step fails is left behind.
pub struct JobSubmitter {
    client: Arc<dyn RemoteJobClient>,
    blobs: Arc<dyn BlobStore>,
    presets: Arc<dyn PresetResolver>,
    config: OrchestratorConfig,
}

impl JobSubmitter {
    pub fn new(
        client: Arc<dyn RemoteJobClient>,
        blobs: Arc<dyn BlobStore>,
        presets: Arc<dyn PresetResolver>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            client,
            blobs,
            presets,
            config,
        }
    }

    /// Submit an encode job and return its remote id
    pub async fn submit(&self, request: &EncodeRequest) -> Result<String> {
        // Everything that can be checked locally is checked before the first remote call
        let first = request
            .inputs
            .first()
            .ok_or_else(|| OrchestratorError::validation("at least one input location is required"))?;
        if request.preset_name.trim().is_empty() {
            return Err(OrchestratorError::validation("preset name is empty"));
        }

        let input_asset_name = naming::input_asset_name_for(first)?;
        let output_asset_name = naming::output_asset_name(first, request.output_account.as_deref())?;
        let blob_names = request
            .inputs
            .iter()
            .map(SourceLocation::destination_blob_name)
            .collect::<Result<Vec<_>>>()?;
        let output_container = match request
            .output_container
            .as_ref()
            .or(self.config.default_output_container.as_ref())
        {
            Some(container) => container.clone(),
            None => {
                let derived = naming::default_output_container(first)?;
                debug!("No output container named, results of {} go to {}", first, derived);
                derived
            }
        };
        let task_name = self.correlation_for(request, &output_container).encode().map_err(|e| {
            error!("Correlation data for {} does not fit the task name: {}", first, e);
            e
        })?;
        let configuration = self.presets.resolve(&request.preset_name)?;
        let job_name = naming::job_name(&output_asset_name);

        let input_asset = self
            .create_input_asset(&request.inputs, &blob_names, &input_asset_name, first)
            .await?;

        let engine_id = self.resolve_engine().await?;

        let subscription = match request.callback_endpoint.as_ref().or(self.config.callback_endpoint.as_ref()) {
            Some(endpoint) => Some(NotificationSubscription::until_finished(self.register_callback(endpoint).await?)),
            None => None,
        };

        let job_request = JobRequest {
            name: job_name,
            engine_id,
            input_asset_id: input_asset.id.clone(),
            configuration,
            output: OutputAssetSpec {
                name: output_asset_name,
                account: request.output_account.clone(),
            },
            task_name,
            subscription,
        };

        let job_id = self.client.submit_job(&job_request).await.map_err(|e| {
            error!(
                "Failed to submit job {} (input {}, output {}): {}",
                job_request.name, job_request.input_asset_id, job_request.output.name, e
            );
            OrchestratorError::remote(format!("submitting job {}", job_request.name), e)
        })?;

        info!(
            "Started job {} ({}) for preset {} with input asset {}",
            job_id, job_request.name, request.preset_name, input_asset.id
        );
        Ok(job_id)
    }

    fn correlation_for(&self, request: &EncodeRequest, output_container: &Url) -> CorrelationData {
        let mut correlation = CorrelationData::new();
        if let Some(context) = &request.operation_context {
            correlation.insert(OPERATION_CONTEXT_KEY, context.to_string());
        }
        correlation.insert(OUTPUT_CONTAINER_KEY, output_container.as_str());
        correlation
    }

    /// Create one input asset and copy or upload every input into it
    async fn create_input_asset(
        &self,
        inputs: &[SourceLocation],
        blob_names: &[String],
        asset_name: &str,
        first: &SourceLocation,
    ) -> Result<AssetHandle> {
        let account = match first {
            SourceLocation::Blob(blob) => Some(blob.account.as_str()),
            SourceLocation::File(_) => None,
        };

        let asset = self
            .client
            .create_input_resource(asset_name, account)
            .await
            .map_err(|e| {
                error!("Error creating input asset {} for {}: {}", asset_name, first, e);
                OrchestratorError::remote(format!("creating input asset for {first}"), e)
            })?;
        info!("Created input asset {} ({})", asset.id, asset_name);

        for (input, blob_name) in inputs.iter().zip(blob_names) {
            self.transfer_input(input, blob_name, &asset).await?;
        }

        self.client.finalize_file_listing(&asset.id).await.map_err(|e| {
            error!("Failed to finalize file listing of {}: {}", asset.id, e);
            OrchestratorError::remote(format!("finalizing file listing of input asset {}", asset.id), e)
        })?;
        debug!("Finalized file listing of {} at {}", asset_name, asset.uri);

        Ok(asset)
    }

    async fn transfer_input(&self, input: &SourceLocation, blob_name: &str, asset: &AssetHandle) -> Result<()> {
        let started = Instant::now();
        let failed = |e: crate::error::RemoteFailure| {
            error!("Failed to transfer {} into input asset {}: {}", input, asset.id, e);
            OrchestratorError::remote(format!("transferring {input} into input asset {}", asset.id), e)
        };

        match input {
            SourceLocation::Blob(blob) => {
                match self.blobs.exists(&blob.url).await {
                    Ok(true) => {}
                    Ok(false) => error!("Attempted to use nonexistent blob {} as encoding input", blob.url),
                    Err(e) => warn!("Could not check whether {} exists: {}", blob.url, e),
                }

                let destination = blob_uri_in(&asset.uri, blob_name)?;
                self.blobs.copy_by_uri(&blob.url, &destination).await.map_err(failed)?;
            }
            SourceLocation::File(path) => {
                if !path.exists() {
                    error!("Attempted to use nonexistent file {} as encoding input", path.display());
                }
                self.blobs.upload_file(path, &asset.uri).await.map_err(failed)?;
            }
        }

        info!("Transferred {} as {} in {} ms", input, blob_name, started.elapsed().as_millis());
        Ok(())
    }

    async fn resolve_engine(&self) -> Result<String> {
        let engine_name = &self.config.engine_name;
        let engine_id = self.client.resolve_engine_id(engine_name).await.map_err(|e| {
            error!("Could not look up media processor {}: {}", engine_name, e);
            OrchestratorError::remote(format!("looking up media processor {engine_name}"), e)
        })?;

        engine_id.ok_or_else(|| {
            error!("Media processor {} not found", engine_name);
            OrchestratorError::not_found("media processor", engine_name.clone())
        })
    }

    async fn register_callback(&self, endpoint: &Url) -> Result<String> {
        let name = &self.config.notification_endpoint_name;
        self.client
            .get_or_create_callback_registration(name, endpoint)
            .await
            .map_err(|e| {
                error!("Could not register notification endpoint {}: {}", endpoint, e);
                OrchestratorError::remote(format!("registering notification endpoint {endpoint}"), e)
            })
    }
}
