pub mod capacity;
pub mod config;
pub mod correlation;
pub mod error;
pub mod location;
pub mod monitor;
pub mod naming;
pub mod notification;
pub mod preset;
pub mod remote;
pub mod storage;
pub mod submit;

#[cfg(test)]
mod testing;

pub use capacity::{CapacityLease, ReservedCapacityManager, ReservedUnitType};
pub use config::OrchestratorConfig;
pub use correlation::CorrelationData;
pub use error::{OrchestratorError, RemoteFailure, Result};
pub use location::{BlobLocation, SourceLocation};
pub use monitor::{wait_for_job, wait_for_terminal_state};
pub use notification::{NotificationMessage, NotificationOutcome, NotificationProcessor, Transition};
pub use preset::{ConfiguredPresets, PresetResolver};
pub use remote::{JobState, RemoteJobClient};
pub use storage::BlobStore;
pub use submit::{EncodeRequest, JobSubmitter};
