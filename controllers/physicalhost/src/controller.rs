//! Wires the `PhysicalHost` reconciler into `kube_runtime::Controller` and
//! runs the inspection sink alongside it as a background task
//! ("Reconciler runtime").

use crate::reconciler::{error_policy, reconcile, Context};
use crds::physical_host::PhysicalHost;
use futures::StreamExt;
use kube::runtime::{watcher, Controller};
use kube::{Api, Client};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Runtime configuration read from the environment by `main`.
pub struct ControllerConfig {
    /// Namespace to watch; `None` watches all namespaces.
    pub namespace: Option<String>,
    /// Port the inspection sink's HTTP server binds to.
    pub inspection_sink_port: u16,
    /// Time allowed for an inspection report to arrive.
    pub inspection_timeout: Duration,
    /// Time a host may remain in a non-terminal state with no
    /// progress before being forced to `Error`.
    pub stuck_state_timeout: Duration,
    /// Hold time before a silent Provisioning→Provisioned promotion.
    pub provisioning_hold_time: Duration,
}

/// Runs the `PhysicalHost` controller and the inspection sink HTTP server
/// concurrently until either exits.
pub async fn run(client: Client, config: ControllerConfig) -> anyhow::Result<()> {
    let hosts: Api<PhysicalHost> = match &config.namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };

    let ctx = Arc::new(Context {
        client: client.clone(),
        bmc_factory: Arc::new(bmc::factory::RedfishBmcClientFactory),
        inspection_timeout: config.inspection_timeout,
        stuck_state_timeout: config.stuck_state_timeout,
        provisioning_hold_time: config.provisioning_hold_time,
    });

    let sink_hosts: Api<PhysicalHost> = match &config.namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };
    let sink_router = inspection_sink::router(sink_hosts);
    let sink_addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.inspection_sink_port));

    let sink_task = tokio::spawn(async move {
        info!(addr = %sink_addr, "inspection sink listening");
        let listener = tokio::net::TcpListener::bind(sink_addr).await?;
        axum::serve(listener, sink_router).await?;
        Ok::<(), std::io::Error>(())
    });

    let controller = Controller::new(hosts, watcher::Config::default())
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object_ref, action)) => {
                    tracing::debug!(?object_ref, ?action, "reconciled PhysicalHost");
                }
                Err(err) => warn!(error = %err, "PhysicalHost reconcile failed"),
            }
        });

    tokio::select! {
        () = controller => {
            warn!("PhysicalHost controller stream ended");
        }
        result = sink_task => {
            result??;
        }
    }

    Ok(())
}
