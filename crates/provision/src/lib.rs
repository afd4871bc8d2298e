//! Concurrent multi-resource provisioning engine.
//!
//! Given a declarative [`ResourceRequest`], the engine allocates projects
//! from a [`ProjectPool`], assigns zones round-robin per project, fans out
//! one creation task per requested cluster/VM under a shared deadline, and
//! folds the results into an [`Inventory`]. Any failure - pool exhaustion,
//! zone enumeration, an individual creation, the deadline - fails the run
//! as a whole: the caller gets either a complete inventory or a single
//! terminating error. Partially-created cloud resources are reclaimed by
//! the broker's separate cleanup path, never here.

pub mod coordinator;
pub mod error;
pub mod pool;
pub mod request;
pub mod ring;

use std::path::Path;

use quarry_cloud::CredentialInstaller;

pub use coordinator::{Coordinator, CreationResult, DEFAULT_OPERATION_TIMEOUT};
pub use error::ProvisionError;
pub use pool::{ProjectHandle, ProjectPool};
pub use request::{ProjectResources, ResourceRequest};
pub use ring::ZoneRing;

pub use quarry_cloud::{Inventory, ProjectInventory};

/// Run one provisioning run and materialize credentials for its clusters.
///
/// Returns the inventory only when both provisioning and credential
/// installation succeed.
///
/// # Errors
/// Provisioning failures surface as-is. When installation fails, the cloud
/// resources already exist but are not usable through the artifact; that
/// case is reported as [`ProvisionError::Credentials`] so callers can tell
/// the two apart.
pub async fn construct(
    coordinator: &Coordinator,
    installer: &dyn CredentialInstaller,
    request: &ResourceRequest,
    pool: &mut ProjectPool,
    kubeconfig: &Path,
) -> Result<Inventory, ProvisionError> {
    let inventory = coordinator.provision(request, pool).await?;
    installer
        .install(&inventory, kubeconfig)
        .await
        .map_err(ProvisionError::Credentials)?;
    Ok(inventory)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use async_trait::async_trait;
    use quarry_cloud::{
        CloudError, ClusterCreator, ClusterSpec, InstanceInfo, VmCreator, VmSpec,
    };

    use super::*;

    struct InstantClusters;

    #[async_trait]
    impl ClusterCreator for InstantClusters {
        async fn create(
            &self,
            _project: &str,
            spec: &ClusterSpec,
        ) -> Result<InstanceInfo, CloudError> {
            Ok(InstanceInfo {
                name: "cluster-1".to_string(),
                zone: spec.explicit_zone().unwrap_or_default().to_string(),
            })
        }
    }

    struct InstantVms;

    #[async_trait]
    impl VmCreator for InstantVms {
        async fn create(&self, _project: &str, spec: &VmSpec) -> Result<InstanceInfo, CloudError> {
            Ok(InstanceInfo {
                name: "vm-1".to_string(),
                zone: spec.explicit_zone().unwrap_or_default().to_string(),
            })
        }

        async fn list_zones(&self, _project: &str) -> Result<Vec<String>, CloudError> {
            Ok(vec!["us-a".to_string()])
        }
    }

    struct FailingInstaller;

    #[async_trait]
    impl CredentialInstaller for FailingInstaller {
        async fn install(&self, _inventory: &Inventory, _dest: &Path) -> Result<(), CloudError> {
            Err(CloudError::Config("no gcloud on this host".to_string()))
        }
    }

    struct NullInstaller;

    #[async_trait]
    impl CredentialInstaller for NullInstaller {
        async fn install(&self, _inventory: &Inventory, _dest: &Path) -> Result<(), CloudError> {
            Ok(())
        }
    }

    fn simple_request() -> ResourceRequest {
        ResourceRequest::from_yaml("pool-x:\n  - clusters:\n      - {}\n").unwrap()
    }

    #[tokio::test]
    async fn construct_returns_inventory_on_success() {
        let coordinator = Coordinator::new(Arc::new(InstantClusters), Arc::new(InstantVms));
        let mut pool = ProjectPool::new();
        pool.insert("pool-x", "proj-1");

        let inventory = construct(
            &coordinator,
            &NullInstaller,
            &simple_request(),
            &mut pool,
            &PathBuf::from("/tmp/unused-kubeconfig"),
        )
        .await
        .unwrap();

        assert_eq!(inventory["proj-1"].clusters.len(), 1);
    }

    #[tokio::test]
    async fn credential_failure_fails_construct_after_creation() {
        let coordinator = Coordinator::new(Arc::new(InstantClusters), Arc::new(InstantVms));
        let mut pool = ProjectPool::new();
        pool.insert("pool-x", "proj-1");

        let err = construct(
            &coordinator,
            &FailingInstaller,
            &simple_request(),
            &mut pool,
            &PathBuf::from("/tmp/unused-kubeconfig"),
        )
        .await
        .unwrap_err();

        // Resources were created; only the artifact is unusable.
        assert!(matches!(err, ProvisionError::Credentials(_)));
    }
}
