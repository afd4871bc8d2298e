//! Error taxonomy for a provisioning run.

use std::time::Duration;

use quarry_cloud::CloudError;
use thiserror::Error;
use tokio::task::JoinError;

/// Errors that terminate a provisioning run.
///
/// Every variant is fatal: the run returns either a complete inventory or
/// exactly one of these. Cloud resources created before the failure are not
/// rolled back here; the broker's cleanup path reclaims them.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// The pool ran out of projects for a resource kind.
    #[error("project pool exhausted for resource kind {kind:?}")]
    PoolExhausted { kind: String },

    /// A project reported no usable zones. There is no fallback zone.
    #[error("project {project:?} has no available zones")]
    NoZones { project: String },

    /// Zone enumeration failed for a project.
    #[error("failed to list zones for project {project:?}")]
    ZoneListing {
        project: String,
        #[source]
        source: CloudError,
    },

    /// An individual cluster or VM creation failed.
    #[error("creation failed in project {project:?}")]
    Creation {
        project: String,
        #[source]
        source: CloudError,
    },

    /// The run-wide deadline fired before every creation finished.
    #[error("provisioning deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    /// A creation was cancelled after a sibling failed. Never surfaced to
    /// the caller when the sibling's original error is available.
    #[error("creation cancelled after sibling failure")]
    Cancelled,

    /// Credential materialization failed. The cloud resources exist but
    /// are not usable through the credential artifact.
    #[error("credential installation failed")]
    Credentials(#[source] CloudError),

    /// A creation task panicked.
    #[error("creation task panicked")]
    TaskPanic(#[from] JoinError),
}
