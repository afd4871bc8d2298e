//! GKE cluster creation.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::api::GcpApi;
use super::models::{
    ClusterDefinition, CreateClusterBody, GkeCluster, NodeConfigDefinition, NodePoolDefinition,
};
use crate::error::CloudError;
use crate::names;
use crate::traits::ClusterCreator;
use crate::types::{ClusterSpec, InstanceInfo};

/// Polling interval while a cluster is provisioning.
const POLL_INTERVAL_SECS: u64 = 15;

const NAME_PREFIX: &str = "gke";

/// [`ClusterCreator`] backed by the GKE REST API.
#[derive(Clone)]
pub struct GkeClusters {
    api: GcpApi,
    base_url: String,
}

impl GkeClusters {
    /// Production GKE endpoint.
    pub const ENDPOINT: &'static str = "https://container.googleapis.com";

    #[must_use]
    pub fn new(api: GcpApi) -> Self {
        Self::with_endpoint(api, Self::ENDPOINT)
    }

    /// Point the client at a different endpoint (tests).
    pub fn with_endpoint(api: GcpApi, endpoint: impl Into<String>) -> Self {
        Self {
            api,
            base_url: endpoint.into(),
        }
    }

    fn cluster_url(&self, project: &str, zone: &str, name: &str) -> String {
        format!(
            "{}/v1/projects/{project}/locations/{zone}/clusters/{name}",
            self.base_url
        )
    }
}

#[async_trait]
impl ClusterCreator for GkeClusters {
    async fn create(
        &self,
        project: &str,
        spec: &ClusterSpec,
    ) -> Result<InstanceInfo, CloudError> {
        let zone = spec
            .explicit_zone()
            .ok_or_else(|| CloudError::Config("cluster spec has no zone assigned".to_string()))?;
        let name = spec
            .name
            .clone()
            .unwrap_or_else(|| names::generate(NAME_PREFIX));

        info!(project, zone, name = %name, "creating GKE cluster");

        let body = CreateClusterBody {
            cluster: ClusterDefinition {
                name: name.clone(),
                initial_cluster_version: spec.version.clone(),
                node_pools: vec![NodePoolDefinition {
                    name: "default-pool".to_string(),
                    initial_node_count: spec.num_nodes,
                    config: NodeConfigDefinition {
                        machine_type: spec.machine_type.clone(),
                        disk_size_gb: Some(100),
                    },
                }],
            },
        };

        let url = format!(
            "{}/v1/projects/{project}/locations/{zone}/clusters",
            self.base_url
        );
        self.api.post_operation(&url, &body).await?;

        loop {
            let cluster: GkeCluster = self.api.get(&self.cluster_url(project, zone, &name)).await?;
            match cluster.status.as_str() {
                "RUNNING" => {
                    info!(project, name = %name, "GKE cluster is running");
                    return Ok(InstanceInfo {
                        name,
                        zone: zone.to_string(),
                    });
                }
                "ERROR" | "DEGRADED" => {
                    return Err(CloudError::Api {
                        status: 500,
                        message: format!("cluster {name} entered {} state", cluster.status),
                    });
                }
                other => {
                    debug!(project, name = %name, status = other, "cluster not ready yet");
                }
            }
            tokio::time::sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await;
        }
    }
}
