//! Google Cloud provisioning backends.
//!
//! - [`GkeClusters`] creates managed Kubernetes clusters.
//! - [`GceInstances`] creates virtual machines and lists zones.
//!
//! Both share [`GcpApi`], a bearer-token REST helper.

mod api;
mod clusters;
mod instances;
pub(crate) mod models;

pub use api::GcpApi;
pub use clusters::GkeClusters;
pub use instances::GceInstances;
