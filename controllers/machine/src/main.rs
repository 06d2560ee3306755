//! `machine-controller` binary entry point.

use machine_controller::ControllerConfig;
use std::env;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    info!("Starting Beskar7Machine controller");

    let namespace = env::var("WATCH_NAMESPACE").ok();
    info!(namespace = namespace.as_deref().unwrap_or("all namespaces"), "configuration loaded");

    let config = ControllerConfig { namespace };

    let client = kube::Client::try_default().await?;
    machine_controller::run(client, config).await
}
