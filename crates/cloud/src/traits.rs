//! Capability traits for resource creation and credential installation.

use std::path::Path;

use async_trait::async_trait;

use crate::error::CloudError;
use crate::types::{ClusterSpec, InstanceInfo, Inventory, VmSpec};

/// Creates managed Kubernetes clusters.
///
/// Implementations must wind down promptly when the calling future is
/// dropped; the provisioning coordinator cancels in-flight work by dropping
/// it. The remote operation may still complete on the provider side.
#[async_trait]
pub trait ClusterCreator: Send + Sync {
    /// Provision one cluster in `project` and wait until it is usable.
    ///
    /// The spec's zone must already be assigned by the caller.
    ///
    /// # Errors
    /// Returns an error if the provider rejects or fails the creation.
    async fn create(&self, project: &str, spec: &ClusterSpec)
        -> Result<InstanceInfo, CloudError>;
}

/// Creates virtual machines and enumerates zones.
#[async_trait]
pub trait VmCreator: Send + Sync {
    /// Provision one VM in `project` and wait until it is running.
    ///
    /// # Errors
    /// Returns an error if the provider rejects or fails the creation.
    async fn create(&self, project: &str, spec: &VmSpec) -> Result<InstanceInfo, CloudError>;

    /// Zones available to `project`, in provider order.
    ///
    /// # Errors
    /// Returns an error if the zone listing cannot be fetched.
    async fn list_zones(&self, project: &str) -> Result<Vec<String>, CloudError>;
}

/// Merges access credentials for created resources into one artifact file.
#[async_trait]
pub trait CredentialInstaller: Send + Sync {
    /// Write a single merged credential file covering every cluster in
    /// `inventory` to `dest`.
    ///
    /// # Errors
    /// Returns an error if connection info cannot be resolved or the
    /// artifact cannot be written.
    async fn install(&self, inventory: &Inventory, dest: &Path) -> Result<(), CloudError>;
}
