use std::collections::BTreeMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};

/// Longest encoded blob the remote task name field accepts
pub const MAX_ENCODED_LEN: usize = 4000;

/// Key carrying the caller's opaque operation context (a JSON document rendered as a string)
pub const OPERATION_CONTEXT_KEY: &str = "operationContext";

/// Key carrying the container URI that finished outputs are copied into
pub const OUTPUT_CONTAINER_KEY: &str = "outputAssetContainer";

/// Caller state carried across the asynchronous boundary inside the job's first task name.
///
/// The remote service exposes no user-defined field on a job, so the task "Name" is the
/// only channel that survives submission and comes back on every later read. Whatever
/// must be known when a notification arrives has to live here, encoded by
/// [`CorrelationData::encode`] and bounded by [`MAX_ENCODED_LEN`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationData(BTreeMap<String, String>);

impl CorrelationData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn operation_context(&self) -> Option<&str> {
        self.get(OPERATION_CONTEXT_KEY)
    }

    pub fn output_container(&self) -> Option<&str> {
        self.get(OUTPUT_CONTAINER_KEY)
    }

    /// Serialize to JSON, then base64url without padding.
    ///
    /// Fails with `Validation` when the result would not fit the task name field.
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_string(&self.0)
            .map_err(|e| OrchestratorError::validation(format!("correlation data is not serializable: {e}")))?;
        let encoded = URL_SAFE_NO_PAD.encode(json.as_bytes());

        if encoded.len() > MAX_ENCODED_LEN {
            return Err(OrchestratorError::validation(format!(
                "encoded correlation data is {} characters, limit is {}",
                encoded.len(),
                MAX_ENCODED_LEN
            )));
        }

        Ok(encoded)
    }

    /// Inverse of [`encode`](Self::encode).
    pub fn decode(encoded: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded.trim().trim_end_matches('=').as_bytes())
            .map_err(|e| OrchestratorError::validation(format!("correlation data is not base64url: {e}")))?;
        let json = String::from_utf8(bytes)
            .map_err(|e| OrchestratorError::validation(format!("correlation data is not UTF-8: {e}")))?;

        // Jobs submitted without any correlation data carry the JSON literal `null`
        let map: Option<BTreeMap<String, String>> = serde_json::from_str(&json)
            .map_err(|e| OrchestratorError::validation(format!("correlation data is not a string map: {e}")))?;

        Ok(Self(map.unwrap_or_default()))
    }
}

impl FromIterator<(String, String)> for CorrelationData {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<BTreeMap<String, String>> for CorrelationData {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}
