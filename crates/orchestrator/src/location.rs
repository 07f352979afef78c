use std::fmt;
use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;
use url::{Host, Url};

use crate::error::{OrchestratorError, Result};

/// Longest container name blob storage accepts
const MAX_CONTAINER_NAME_LEN: usize = 63;

/// Where a submission input comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    /// A blob already in remote storage; copied server-side
    Blob(BlobLocation),
    /// A local file; uploaded
    File(PathBuf),
}

impl SourceLocation {
    /// Parse `http(s)://` strings (any case) as blobs and anything else as a local path
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(OrchestratorError::validation("source location is empty"));
        }

        if has_http_scheme(trimmed) {
            let url = Url::parse(trimmed)
                .map_err(|e| OrchestratorError::validation(format!("invalid blob URI {trimmed}: {e}")))?;
            return Ok(Self::Blob(BlobLocation::from_url(url)?));
        }

        Ok(Self::File(PathBuf::from(trimmed)))
    }

    /// File name component: the blob name's last segment or the path's file name
    pub fn file_name(&self) -> Option<&str> {
        match self {
            Self::Blob(blob) => blob.blob_name.rsplit('/').next().filter(|s| !s.is_empty()),
            Self::File(path) => path.file_name().and_then(|n| n.to_str()),
        }
    }

    /// Name this input gets inside the input asset's container
    pub fn destination_blob_name(&self) -> Result<String> {
        match self {
            Self::Blob(blob) => Ok(blob.blob_name.clone()),
            Self::File(path) => upload_blob_name(path),
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blob(blob) => write!(f, "{}", blob.url),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

fn has_http_scheme(raw: &str) -> bool {
    raw.split_once("://")
        .map(|(scheme, _)| scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https"))
        .unwrap_or(false)
}

/// A blob URI split into account, container and blob name.
///
/// Accepts virtual-host style (`https://{account}.blob.core.windows.net/{container}/{blob}`)
/// and the path style used by local emulators (`http://127.0.0.1:10000/{account}/{container}/{blob}`).
/// `blob_name` is kept decoded; `url` is kept as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobLocation {
    pub url: Url,
    pub account: String,
    pub container: String,
    pub blob_name: String,
    /// Account is the first path segment rather than part of the host
    pub path_style: bool,
}

impl BlobLocation {
    pub fn from_url(url: Url) -> Result<Self> {
        let (path_style, domain) = match url.host() {
            Some(Host::Domain(domain)) => (domain.eq_ignore_ascii_case("localhost"), domain.to_string()),
            Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => (true, String::new()),
            None => return Err(OrchestratorError::validation(format!("blob URI has no host: {url}"))),
        };

        let mut segments: Vec<String> = url
            .path_segments()
            .map(|segs| segs.filter(|s| !s.is_empty()).map(str::to_string).collect())
            .unwrap_or_default();

        let account = if path_style {
            if segments.is_empty() {
                return Err(OrchestratorError::validation(format!("blob URI has no account segment: {url}")));
            }
            segments.remove(0)
        } else {
            domain.split('.').next().unwrap_or_default().to_string()
        };

        if account.is_empty() {
            return Err(OrchestratorError::validation(format!("blob URI has no account: {url}")));
        }
        if segments.is_empty() {
            return Err(OrchestratorError::validation(format!("blob URI has no container: {url}")));
        }

        let container = segments.remove(0);
        if segments.is_empty() {
            return Err(OrchestratorError::validation(format!("blob URI names a container but no blob: {url}")));
        }

        let blob_name = segments
            .iter()
            .map(|segment| {
                percent_decode_str(segment)
                    .decode_utf8()
                    .map(|decoded| decoded.into_owned())
                    .map_err(|e| OrchestratorError::validation(format!("blob name in {url} is not UTF-8: {e}")))
            })
            .collect::<Result<Vec<_>>>()?
            .join("/");

        Ok(Self {
            url,
            account,
            container,
            blob_name,
            path_style,
        })
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw.trim())
            .map_err(|e| OrchestratorError::validation(format!("invalid blob URI {raw}: {e}")))?;
        Self::from_url(url)
    }

    /// URI of another container in the same storage account, without query or fragment
    pub fn sibling_container(&self, name: &str) -> Result<Url> {
        if name.is_empty() || name.len() > MAX_CONTAINER_NAME_LEN {
            return Err(OrchestratorError::validation(format!(
                "container name {name:?} must be 1 to {MAX_CONTAINER_NAME_LEN} characters"
            )));
        }

        let mut uri = self.url.clone();
        uri.set_query(None);
        uri.set_fragment(None);
        if self.path_style {
            uri.set_path(&format!("/{}/{}", self.account, name));
        } else {
            uri.set_path(&format!("/{name}"));
        }
        Ok(uri)
    }
}

/// URI of `blob_name` inside the container addressed by `container`, keeping any query (SAS) intact.
///
/// `blob_name` is a raw name; each `/`-separated segment is percent-encoded here.
pub fn blob_uri_in(container: &Url, blob_name: &str) -> Result<Url> {
    let blob_name = blob_name.trim_start_matches('/');
    if blob_name.is_empty() {
        return Err(OrchestratorError::validation(format!("empty blob name for container {container}")));
    }

    let mut uri = container.clone();
    uri.path_segments_mut()
        .map_err(|_| OrchestratorError::validation(format!("container URI cannot hold blobs: {container}")))?
        .pop_if_empty()
        .extend(blob_name.split('/'));
    Ok(uri)
}

/// Blob name a local file gets when uploaded
pub fn upload_blob_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| OrchestratorError::validation(format!("file path has no file name: {}", path.display())))
}
