//! Quarry CLI - provision ephemeral cloud resources for CI workloads.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use quarry_cloud::gcp::{GceInstances, GcpApi, GkeClusters};
use quarry_cloud::kubeconfig::KubeconfigInstaller;
use quarry_provision::{construct, Coordinator, ProjectPool, ResourceRequest};

/// Quarry CLI - declarative cloud resource construction for CI.
#[derive(Parser)]
#[command(name = "quarry")]
#[command(about = "Declarative cloud resource construction for CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the resources described by a request document
    Construct {
        /// Request document (resource kind -> per-project specs)
        #[arg(long)]
        request: PathBuf,

        /// Pool document (resource kind -> available project ids)
        #[arg(long)]
        pool: PathBuf,

        /// Destination for the merged kubeconfig artifact
        #[arg(long)]
        kubeconfig: PathBuf,

        /// Optional inventory dump (JSON)
        #[arg(long)]
        inventory: Option<PathBuf>,

        /// Whole-run deadline in seconds
        #[arg(long, default_value = "900")]
        timeout_secs: u64,

        /// OAuth2 access token for Google APIs
        #[arg(long, env = "GCP_ACCESS_TOKEN", hide_env_values = true)]
        access_token: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("quarry_cloud=debug,quarry_provision=debug,info")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Construct {
            request,
            pool,
            kubeconfig,
            inventory,
            timeout_secs,
            access_token,
        } => {
            let request_doc = std::fs::read_to_string(&request)
                .with_context(|| format!("reading request document {}", request.display()))?;
            let request =
                ResourceRequest::from_yaml(&request_doc).context("parsing request document")?;

            let pool_doc = std::fs::read_to_string(&pool)
                .with_context(|| format!("reading pool document {}", pool.display()))?;
            let mut pool = ProjectPool::from_yaml(&pool_doc).context("parsing pool document")?;

            let api = GcpApi::new(access_token).context("building GCP client")?;
            let coordinator = Coordinator::new(
                Arc::new(GkeClusters::new(api.clone())),
                Arc::new(GceInstances::new(api.clone())),
            )
            .with_timeout(Duration::from_secs(timeout_secs));
            let installer = KubeconfigInstaller::new(api);

            info!(tasks = request.task_count(), "starting provisioning run");
            let result = construct(&coordinator, &installer, &request, &mut pool, &kubeconfig)
                .await
                .context("provisioning run failed")?;

            if let Some(path) = inventory {
                let json = serde_json::to_string_pretty(&result)?;
                std::fs::write(&path, json)
                    .with_context(|| format!("writing inventory {}", path.display()))?;
                info!(path = %path.display(), "inventory written");
            }

            info!(
                projects = result.len(),
                kubeconfig = %kubeconfig.display(),
                "construction complete"
            );
        }
    }

    Ok(())
}
