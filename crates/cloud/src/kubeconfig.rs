//! Merged kubeconfig generation for created clusters.
//!
//! After a successful provisioning run, every cluster in the inventory gets
//! one cluster/context/user triple in a single kubeconfig document, using
//! `gcloud` exec authentication. Consumers switch between created clusters
//! by context name.

use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::CloudError;
use crate::gcp::models::GkeCluster;
use crate::gcp::{GcpApi, GkeClusters};
use crate::traits::CredentialInstaller;
use crate::types::Inventory;

#[derive(Debug, Serialize)]
struct Kubeconfig {
    #[serde(rename = "apiVersion")]
    api_version: String,
    kind: String,
    clusters: Vec<NamedCluster>,
    contexts: Vec<NamedContext>,
    users: Vec<NamedUser>,
    #[serde(rename = "current-context")]
    current_context: String,
}

#[derive(Debug, Serialize)]
struct NamedCluster {
    name: String,
    cluster: ClusterEndpoint,
}

#[derive(Debug, Serialize)]
struct ClusterEndpoint {
    server: String,
}

#[derive(Debug, Serialize)]
struct NamedContext {
    name: String,
    context: Context,
}

#[derive(Debug, Serialize)]
struct Context {
    cluster: String,
    user: String,
}

#[derive(Debug, Serialize)]
struct NamedUser {
    name: String,
    user: User,
}

#[derive(Debug, Serialize)]
struct User {
    exec: ExecConfig,
}

#[derive(Debug, Serialize)]
struct ExecConfig {
    #[serde(rename = "apiVersion")]
    api_version: String,
    command: String,
    args: Vec<String>,
}

/// [`CredentialInstaller`] that resolves each created cluster's endpoint
/// and merges one `gke_{project}_{zone}_{name}` context per cluster.
#[derive(Clone)]
pub struct KubeconfigInstaller {
    api: GcpApi,
    base_url: String,
}

impl KubeconfigInstaller {
    #[must_use]
    pub fn new(api: GcpApi) -> Self {
        Self::with_endpoint(api, GkeClusters::ENDPOINT)
    }

    /// Point the installer at a different GKE endpoint (tests).
    pub fn with_endpoint(api: GcpApi, endpoint: impl Into<String>) -> Self {
        Self {
            api,
            base_url: endpoint.into(),
        }
    }

    async fn cluster_server(
        &self,
        project: &str,
        zone: &str,
        name: &str,
    ) -> Result<String, CloudError> {
        let url = format!(
            "{}/v1/projects/{project}/locations/{zone}/clusters/{name}",
            self.base_url
        );
        let cluster: GkeCluster = self.api.get(&url).await?;
        let endpoint = cluster
            .endpoint
            .ok_or_else(|| CloudError::Config(format!("cluster {name} has no endpoint")))?;
        Ok(format!("https://{endpoint}"))
    }
}

#[async_trait]
impl CredentialInstaller for KubeconfigInstaller {
    async fn install(&self, inventory: &Inventory, dest: &Path) -> Result<(), CloudError> {
        let mut doc = Kubeconfig {
            api_version: "v1".to_string(),
            kind: "Config".to_string(),
            clusters: Vec::new(),
            contexts: Vec::new(),
            users: Vec::new(),
            current_context: String::new(),
        };

        for (project, resources) in inventory {
            for cluster in &resources.clusters {
                let server = self
                    .cluster_server(project, &cluster.zone, &cluster.name)
                    .await?;
                let context = format!("gke_{project}_{}_{}", cluster.zone, cluster.name);
                debug!(context = %context, "adding kubeconfig context");

                doc.clusters.push(NamedCluster {
                    name: context.clone(),
                    cluster: ClusterEndpoint { server },
                });
                doc.contexts.push(NamedContext {
                    name: context.clone(),
                    context: Context {
                        cluster: context.clone(),
                        user: context.clone(),
                    },
                });
                doc.users.push(NamedUser {
                    name: context.clone(),
                    user: User {
                        exec: ExecConfig {
                            api_version: "client.authentication.k8s.io/v1beta1".to_string(),
                            command: "gcloud".to_string(),
                            args: vec![
                                "container".to_string(),
                                "clusters".to_string(),
                                "get-credentials".to_string(),
                                cluster.name.clone(),
                                "--project".to_string(),
                                project.clone(),
                                "--zone".to_string(),
                                cluster.zone.clone(),
                            ],
                        },
                    },
                });
            }
        }

        if let Some(first) = doc.contexts.first() {
            doc.current_context = first.name.clone();
        }

        let yaml = serde_yaml::to_string(&doc)?;
        tokio::fs::write(dest, yaml).await?;

        info!(
            path = %dest.display(),
            contexts = doc.contexts.len(),
            "kubeconfig written"
        );
        Ok(())
    }
}
