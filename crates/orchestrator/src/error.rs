use thiserror::Error;

/// Result type used throughout the orchestrator
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Boxed cause carried by [`OrchestratorError::Remote`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Diagnostic record of a failed call against the remote encoding service or its storage.
///
/// Collaborator implementations fill in whatever they know about the request and the
/// response so the failure can be diagnosed from a single log line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{method} {target} failed (status {}): {message}", .status.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string()))]
pub struct RemoteFailure {
    /// HTTP method or storage verb of the failed call
    pub method: String,
    /// Resource path or URI the call targeted
    pub target: String,
    /// Response status code, when a response was received
    pub status: Option<u16>,
    /// Raw response body, when one was received
    pub body: Option<String>,
    /// Short human readable description
    pub message: String,
}

impl RemoteFailure {
    pub fn new(method: impl Into<String>, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            target: target.into(),
            status: None,
            body: None,
            message: message.into(),
        }
    }

    /// A 404 response for `target`
    pub fn not_found(method: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(method, target, "resource not found").with_status(404)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

/// Failure taxonomy of job submission and notification handling
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Bad caller input; never retried
    #[error("validation failed: {0}")]
    Validation(String),

    /// A remote call failed; `context` names the stage that issued it
    #[error("{context}: {source}")]
    Remote {
        context: String,
        #[source]
        source: BoxError,
    },

    /// A required named resource (engine, task, asset, preset, correlation entry) is missing
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// A notification is missing a required property or carries an unparseable value
    #[error("malformed notification: {0}")]
    Protocol(String),

    #[error("unsupported notification event type: {0}")]
    UnsupportedEvent(String),

    #[error("unsupported job state: {0}")]
    UnsupportedState(String),

    /// The remote job reported Error. Cleanup already ran; its failure, if any, rides along.
    #[error("encode job {job_id} failed{}", .cleanup.as_ref().map(|e| format!(" (cleanup also failed: {e})")).unwrap_or_default())]
    JobFailed {
        job_id: String,
        cleanup: Option<Box<OrchestratorError>>,
    },
}

impl OrchestratorError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound { kind, name: name.into() }
    }

    pub fn remote(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Remote {
            context: context.into(),
            source: source.into(),
        }
    }

    /// The remote call diagnostics behind this error, if it wraps one
    pub fn remote_failure(&self) -> Option<&RemoteFailure> {
        match self {
            Self::Remote { source, .. } => source.downcast_ref::<RemoteFailure>(),
            _ => None,
        }
    }
}
