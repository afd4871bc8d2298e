//! Resource specs and provisioning results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Desired shape of one Kubernetes cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSpec {
    /// Explicit cluster name; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Machine type for the default node pool.
    #[serde(default = "default_cluster_machine_type")]
    pub machine_type: String,
    /// Number of nodes in the default pool.
    #[serde(default = "default_num_nodes")]
    pub num_nodes: i32,
    /// Kubernetes version; provider default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Explicit zone; drawn from the project's zone ring when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
}

impl Default for ClusterSpec {
    fn default() -> Self {
        Self {
            name: None,
            machine_type: default_cluster_machine_type(),
            num_nodes: default_num_nodes(),
            version: None,
            zone: None,
        }
    }
}

impl ClusterSpec {
    /// Explicit zone, treating an empty string as unset.
    #[must_use]
    pub fn explicit_zone(&self) -> Option<&str> {
        self.zone.as_deref().filter(|z| !z.is_empty())
    }
}

/// Desired shape of one virtual machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmSpec {
    /// Explicit instance name; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Machine type for the instance.
    #[serde(default = "default_vm_machine_type")]
    pub machine_type: String,
    /// Boot disk source image.
    #[serde(default = "default_source_image")]
    pub source_image: String,
    /// Network tags applied to the instance.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Explicit zone; drawn from the project's zone ring when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
}

impl Default for VmSpec {
    fn default() -> Self {
        Self {
            name: None,
            machine_type: default_vm_machine_type(),
            source_image: default_source_image(),
            tags: Vec::new(),
            zone: None,
        }
    }
}

impl VmSpec {
    /// Explicit zone, treating an empty string as unset.
    #[must_use]
    pub fn explicit_zone(&self) -> Option<&str> {
        self.zone.as_deref().filter(|z| !z.is_empty())
    }
}

fn default_cluster_machine_type() -> String {
    "e2-standard-4".to_string()
}

fn default_num_nodes() -> i32 {
    1
}

fn default_vm_machine_type() -> String {
    "e2-medium".to_string()
}

fn default_source_image() -> String {
    "projects/debian-cloud/global/images/family/debian-12".to_string()
}

/// Identifying information for a created cluster or VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceInfo {
    /// Instance or cluster name.
    pub name: String,
    /// Zone the resource landed in.
    pub zone: String,
}

/// Clusters and VMs successfully created in one project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInventory {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clusters: Vec<InstanceInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vms: Vec<InstanceInfo>,
}

/// Everything a provisioning run created, keyed by project id.
///
/// Built by the run's result aggregation and handed to the credential
/// materializer; also persisted as broker metadata.
pub type Inventory = BTreeMap<String, ProjectInventory>;
