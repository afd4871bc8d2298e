//! Compute Engine instance creation and zone enumeration.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::api::GcpApi;
use super::models::{
    AccessConfig, AttachedDisk, GceInstance, InitializeParams, InsertInstanceBody,
    NetworkInterface, Tags, ZoneListResponse,
};
use crate::error::CloudError;
use crate::names;
use crate::traits::VmCreator;
use crate::types::{InstanceInfo, VmSpec};

/// Polling interval while an instance is provisioning.
const POLL_INTERVAL_SECS: u64 = 5;

const NAME_PREFIX: &str = "vm";

/// [`VmCreator`] backed by the Compute Engine REST API.
#[derive(Clone)]
pub struct GceInstances {
    api: GcpApi,
    base_url: String,
}

impl GceInstances {
    /// Production Compute Engine endpoint.
    pub const ENDPOINT: &'static str = "https://compute.googleapis.com";

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

    fn instance_url(&self, project: &str, zone: &str, name: &str) -> String {
        format!(
            "{}/compute/v1/projects/{project}/zones/{zone}/instances/{name}",
            self.base_url
        )
    }
}

#[async_trait]
impl VmCreator for GceInstances {
    async fn create(&self, project: &str, spec: &VmSpec) -> Result<InstanceInfo, CloudError> {
        let zone = spec
            .explicit_zone()
            .ok_or_else(|| CloudError::Config("vm spec has no zone assigned".to_string()))?;
        let name = spec
            .name
            .clone()
            .unwrap_or_else(|| names::generate(NAME_PREFIX));

        info!(project, zone, name = %name, "creating Compute Engine instance");

        let body = InsertInstanceBody {
            name: name.clone(),
            machine_type: format!("zones/{zone}/machineTypes/{}", spec.machine_type),
            disks: vec![AttachedDisk {
                boot: true,
                auto_delete: true,
                initialize_params: InitializeParams {
                    source_image: spec.source_image.clone(),
                },
            }],
            network_interfaces: vec![NetworkInterface {
                network: "global/networks/default".to_string(),
                access_configs: Some(vec![AccessConfig {
                    access_type: "ONE_TO_ONE_NAT".to_string(),
                    name: "External NAT".to_string(),
                }]),
            }],
            tags: if spec.tags.is_empty() {
                None
            } else {
                Some(Tags {
                    items: spec.tags.clone(),
                })
            },
        };

        let url = format!(
            "{}/compute/v1/projects/{project}/zones/{zone}/instances",
            self.base_url
        );
        self.api.post_operation(&url, &body).await?;

        loop {
            let instance: GceInstance =
                self.api.get(&self.instance_url(project, zone, &name)).await?;
            match instance.status.as_str() {
                "RUNNING" => {
                    info!(project, name = %name, "instance is running");
                    return Ok(InstanceInfo {
                        name,
                        zone: zone.to_string(),
                    });
                }
                "TERMINATED" | "STOPPING" => {
                    return Err(CloudError::Api {
                        status: 500,
                        message: format!("instance {name} entered {} state", instance.status),
                    });
                }
                other => {
                    debug!(project, name = %name, status = other, "instance not ready yet");
                }
            }
            tokio::time::sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await;
        }
    }

    async fn list_zones(&self, project: &str) -> Result<Vec<String>, CloudError> {
        let url = format!("{}/compute/v1/projects/{project}/zones", self.base_url);
        let response: ZoneListResponse = self.api.get(&url).await?;

        let zones: Vec<String> = response
            .items
            .into_iter()
            .filter(|z| z.status == "UP")
            .map(|z| z.name)
            .collect();

        debug!(project, count = zones.len(), "listed zones");
        Ok(zones)
    }
}
