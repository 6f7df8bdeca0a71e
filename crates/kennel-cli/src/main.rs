//! kennel launcher entry point.
//!
//! Provisions one LXC sandbox from a JSON configuration, keeps it alive
//! until Ctrl-C, then releases every resource it set up.

mod config;

use config::KennelConfig;
use kennel_core::{Resources, ResourcesConfig};
use kennel_domain::{LocalFs, Network, VirshConnector};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr
    tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive("kennel=info".parse()?)
                .add_directive("kennel_core=info".parse()?)
                .add_directive("kennel_domain=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting kennel");

    let config = KennelConfig::from_env();
    tracing::info!(?config, "Configuration loaded");
    config.validate()?;

    let resources_config = ResourcesConfig::from_file(&config.config_path)?;
    let connector = VirshConnector::new(config.virsh_path.clone());

    let resources = Resources::new(
        &connector,
        LocalFs,
        config.sandbox_id.clone(),
        resources_config,
    )
    .await?;
    tracing::info!(
        sandbox_id = %resources.identity(),
        network = resources.network().map(Network::name).unwrap_or("none"),
        "Sandbox ready, press Ctrl-C to release"
    );

    // Wait for shutdown signal; release even if the signal handler failed
    let waited = signal::ctrl_c().await;
    tracing::info!("Received shutdown signal, cleaning up...");

    resources.cleanup().await?;
    waited?;

    tracing::info!("Shutdown complete");
    Ok(())
}
