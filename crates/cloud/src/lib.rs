//! Cloud capability layer for Quarry.
//!
//! This crate defines the resource spec types, the [`ClusterCreator`] and
//! [`VmCreator`] capabilities the provisioning engine fans out over, and
//! their Google Cloud implementations:
//!
//! - **GKE** (Google Kubernetes Engine) - managed Kubernetes clusters
//! - **Compute Engine** - virtual machines and zone enumeration
//!
//! It also owns the [`CredentialInstaller`] seam and the kubeconfig
//! materializer that merges one access context per created cluster into a
//! single artifact file.

pub mod error;
pub mod gcp;
pub mod kubeconfig;
pub mod names;
pub mod traits;
pub mod types;

pub use error::CloudError;
pub use traits::{ClusterCreator, CredentialInstaller, VmCreator};
pub use types::{ClusterSpec, InstanceInfo, Inventory, ProjectInventory, VmSpec};
