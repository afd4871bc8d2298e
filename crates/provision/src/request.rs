//! Declarative resource request documents.

use std::collections::BTreeMap;

use quarry_cloud::{ClusterSpec, VmSpec};
use serde::{Deserialize, Serialize};

/// Clusters and VMs to create within a single pooled project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectResources {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clusters: Vec<ClusterSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vms: Vec<VmSpec>,
}

/// A full provisioning request: resource-kind label to ordered per-project
/// resource groups.
///
/// Each [`ProjectResources`] entry consumes exactly one project from the
/// pool of its kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceRequest {
    pub groups: BTreeMap<String, Vec<ProjectResources>>,
}

impl ResourceRequest {
    /// Parse a YAML request document.
    ///
    /// # Errors
    /// Returns an error if the document does not match the request shape.
    pub fn from_yaml(input: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(input)
    }

    /// Total number of creation tasks this request dispatches.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.groups
            .values()
            .flatten()
            .map(|p| p.clusters.len() + p.vms.len())
            .sum()
    }
}
