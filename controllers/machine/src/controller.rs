//! Wires the `Beskar7Machine` reconciler into `kube_runtime::Controller`.

use crate::reconciler::{error_policy, reconcile, Context};
use crds::machine::Beskar7Machine;
use futures::StreamExt;
use kube::runtime::{watcher, Controller};
use kube::{Api, Client};
use std::sync::Arc;
use tracing::{debug, warn};

/// Runtime configuration read from the environment by `main`.
pub struct ControllerConfig {
    /// Namespace to watch; `None` watches all namespaces.
    pub namespace: Option<String>,
}

/// Runs the `Beskar7Machine` controller until its watch stream ends.
pub async fn run(client: Client, config: ControllerConfig) -> anyhow::Result<()> {
    let machines: Api<Beskar7Machine> = match &config.namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };

    let ctx = Arc::new(Context {
        client: client.clone(),
        bmc_factory: Arc::new(bmc::factory::RedfishBmcClientFactory),
    });

    Controller::new(machines, watcher::Config::default())
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object_ref, action)) => {
                    debug!(?object_ref, ?action, "reconciled Beskar7Machine");
                }
                Err(err) => warn!(error = %err, "Beskar7Machine reconcile failed"),
            }
        })
        .await;

    Ok(())
}
