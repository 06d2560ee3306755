//! `physicalhost-controller` binary entry point.

use physicalhost_controller::ControllerConfig;
use std::env;
use std::time::Duration;
use tracing::info;

fn duration_secs_env(key: &str, default_secs: u64) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(Duration::from_secs(default_secs), Duration::from_secs)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    info!("Starting PhysicalHost controller");

    let namespace = env::var("WATCH_NAMESPACE").ok();
    let inspection_sink_port: u16 = env::var("INSPECTION_SINK_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080);

    info!(
        namespace = namespace.as_deref().unwrap_or("all namespaces"),
        inspection_sink_port, "configuration loaded"
    );

    let config = ControllerConfig {
        namespace,
        inspection_sink_port,
        inspection_timeout: duration_secs_env("INSPECTION_TIMEOUT_SECS", 600),
        stuck_state_timeout: duration_secs_env("STUCK_STATE_TIMEOUT_SECS", 300),
        provisioning_hold_time: duration_secs_env("PROVISIONING_HOLD_TIME_SECS", 120),
    };

    let client = kube::Client::try_default().await?;
    physicalhost_controller::run(client, config).await
}
