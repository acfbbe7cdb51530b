//! NLB Service Controller
//!
//! Keeps an AWS Network Load Balancer, its target groups and listeners
//! converged with every `LoadBalancer` Service of the configured class, and
//! tears them down when the Service goes away.

mod backoff;
mod config;
mod controller;
mod error;
mod events;
mod generator;
mod metrics;
mod nlb;
mod reconciler;
mod store;
#[cfg(test)]
mod test_utils;
mod watcher;

use anyhow::Context as _;
use config::ControllerConfig;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting NLB Service Controller");

    let config = ControllerConfig::from_env().context("failed to load controller configuration")?;

    info!("Configuration:");
    info!("  Cluster: {}", config.cluster_name);
    info!("  Service class: {}", config.service_class);
    info!("  Name prefix: {}", config.name_prefix);
    info!("  Annotations prefix: {}", config.annotations_prefix);
    info!("  Default target type: {}", config.default_target_type);
    info!("  Restrict scheme: {}", config.restrict_scheme);
    info!("  Namespace: {}", config.watch_namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Max concurrent reconciles: {}", config.max_concurrent_reconciles);

    let controller = Controller::new(config)
        .await
        .context("failed to initialize controller")?;
    controller.run().await?;

    Ok(())
}
