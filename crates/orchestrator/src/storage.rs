use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use url::Url;

use crate::remote::RemoteResult;

/// Outcome of a server-side copy that ran to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyInfo {
    pub destination: Url,
    pub bytes_copied: Option<u64>,
}

/// Outcome of an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadInfo {
    pub destination: Url,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// A copy the storage service accepted but may still be running
#[async_trait]
pub trait PendingCopy: Send {
    async fn wait_for_completion(self: Box<Self>) -> RemoteResult<CopyInfo>;
}

/// Moves bytes into and out of the remote service's storage.
///
/// Source-side access grants (SAS) needed for a cross-account copy are the
/// implementation's business.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn exists(&self, uri: &Url) -> RemoteResult<bool>;

    /// Start a server-side copy of `source` to `destination`
    async fn start_copy(&self, source: &Url, destination: &Url) -> RemoteResult<Box<dyn PendingCopy>>;

    /// Upload the file at `path` into the container `destination`, keeping its file name
    async fn upload_file(&self, path: &Path, destination: &Url) -> RemoteResult<UploadInfo>;

    /// Start a copy and wait for it to finish
    async fn copy_by_uri(&self, source: &Url, destination: &Url) -> RemoteResult<CopyInfo> {
        let pending = self.start_copy(source, destination).await?;
        pending.wait_for_completion().await
    }
}
