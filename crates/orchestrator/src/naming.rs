use url::Url;
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};
use crate::location::SourceLocation;

/// Prefix shared by every asset this crate creates
pub const ASSET_PREFIX: &str = "V2";

/// Account segment used for inputs uploaded from local files
pub const LOCAL_ACCOUNT: &str = "local";

/// Account segment used for file outputs when no output account was named
pub const DEFAULT_ACCOUNT: &str = "default";

/// Appended to the source container to name the container outputs land in by default
pub const OUTPUT_CONTAINER_SUFFIX: &str = "output";

/// Length of the random suffix appended to job names
const JOB_SUFFIX_LEN: usize = 11;

/// Input asset name for a batch whose first input lives in `account`/`container`
pub fn input_asset_name(account: &str, container: &str) -> String {
    format!("{ASSET_PREFIX}-{account}-{container}-Input")
}

/// Input asset name derived from the first source of a batch
pub fn input_asset_name_for(source: &SourceLocation) -> Result<String> {
    match source {
        SourceLocation::Blob(blob) => Ok(input_asset_name(&blob.account, &blob.container)),
        SourceLocation::File(_) => {
            let file_name = source.file_name().ok_or_else(|| {
                OrchestratorError::validation(format!("cannot derive an input asset name from {source}"))
            })?;
            Ok(input_asset_name(LOCAL_ACCOUNT, file_name))
        }
    }
}

/// Output asset name for results of `source` written to `output_account`.
///
/// Blob containers must already be lowercase: the remote service rejects anything else only
/// after resources exist, so this is checked before any remote call. File names are
/// lowercased. Without an output account, blobs fall back to their own account.
pub fn output_asset_name(source: &SourceLocation, output_account: Option<&str>) -> Result<String> {
    match source {
        SourceLocation::Blob(blob) => {
            if blob.container != blob.container.to_lowercase() {
                return Err(OrchestratorError::validation(format!(
                    "container name {} must be lowercase",
                    blob.container
                )));
            }
            let account = output_account.unwrap_or(&blob.account);
            Ok(format!("{ASSET_PREFIX}-{account}-{}-Output", blob.container))
        }
        SourceLocation::File(_) => {
            let file_name = source
                .file_name()
                .ok_or_else(|| OrchestratorError::validation(format!("cannot derive an output asset name from {source}")))?
                .to_lowercase();
            let account = output_account.unwrap_or(DEFAULT_ACCOUNT);
            Ok(format!("{ASSET_PREFIX}-{account}-{file_name}-Output"))
        }
    }
}

/// Container outputs of `source` are copied into when a submission names none.
///
/// A `{container}-output` sibling of the source blob's container, in the same account.
/// Local files carry no account, so they need an explicit container.
pub fn default_output_container(source: &SourceLocation) -> Result<Url> {
    match source {
        SourceLocation::Blob(blob) => {
            blob.sibling_container(&format!("{}-{OUTPUT_CONTAINER_SUFFIX}", blob.container.to_lowercase()))
        }
        SourceLocation::File(_) => Err(OrchestratorError::validation(format!(
            "no output container named for local input {source} and none configured"
        ))),
    }
}

/// `{output_asset_name}-{11 random hex chars}`; for uniqueness only, never parsed
pub fn job_name(output_asset_name: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", output_asset_name, &suffix[..JOB_SUFFIX_LEN])
}
