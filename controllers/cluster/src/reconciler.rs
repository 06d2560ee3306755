//! `Beskar7Cluster` reconcile loop.
//!
//! Unlike the `PhysicalHost`/`Beskar7Machine` reconcilers this one touches no
//! BMC: every step is a read of sibling `Beskar7Machine`/`PhysicalHost`
//! objects in the same namespace followed by a status patch.

use crate::endpoint::select_control_plane_endpoint;
use crate::error::ControllerError;
use crate::failure_domains::extract_failure_domains;
use chrono::Utc;
use crds::cluster::{
    aggregate_failure_domains, Beskar7Cluster, Beskar7ClusterStatus, CLUSTER_FINALIZER,
};
use crds::conditions::{
    upsert_condition, Condition, ConditionSeverity, CONTROL_PLANE_ENDPOINT_READY_CONDITION, REASON_NOT_SET,
};
use crds::machine::Beskar7Machine;
use crds::physical_host::PhysicalHost;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// `cluster.x-k8s.io/paused` annotation honored on every object type.
pub const PAUSED_ANNOTATION: &str = "cluster.x-k8s.io/paused";

const DEFAULT_RECONCILE_REQUEUE: Duration = Duration::from_secs(30);
const ENDPOINT_NOT_SET_REQUEUE: Duration = Duration::from_secs(30);

/// Shared reconciler context, handed to every `reconcile` call.
pub struct Context {
    /// Kubernetes client used for the watched `Beskar7Cluster` and its
    /// sibling `Beskar7Machine`/`PhysicalHost` objects.
    pub client: Client,
}

/// Top-level reconcile entry point wired into `kube_runtime::Controller`.
pub async fn reconcile(cluster: Arc<Beskar7Cluster>, ctx: Arc<Context>) -> Result<Action, ControllerError> {
    let namespace = cluster.metadata.namespace.clone().unwrap_or_default();
    let name = cluster.metadata.name.clone().unwrap_or_default();
    let api: Api<Beskar7Cluster> = Api::namespaced(ctx.client.clone(), &namespace);

    if is_paused(&cluster) {
        debug!(cluster = %name, "paused annotation set, skipping reconcile");
        return Ok(Action::await_change());
    }

    if cluster.metadata.deletion_timestamp.is_some() {
        return handle_deletion(&api, &cluster).await;
    }

    if !has_finalizer(&cluster) {
        api.patch(
            &name,
            &PatchParams::default(),
            &Patch::Merge(json!({
                "metadata": { "finalizers": [CLUSTER_FINALIZER] }
            })),
        )
        .await?;
        return Ok(Action::requeue(Duration::from_secs(0)));
    }

    let mut status = cluster.status.clone().unwrap_or_default();
    let now = Utc::now();

    let requeue = reconcile_endpoint(&cluster, &mut status, &ctx, &namespace).await?;
    reconcile_failure_domains(&cluster, &mut status, &ctx, &namespace).await?;

    status.ready = status.control_plane_endpoint.is_some();
    status.observed_generation = cluster.metadata.generation;
    status.last_reconciled = Some(now);
    patch_status(&api, &name, &status).await?;

    Ok(Action::requeue(requeue))
}

/// Honors a user-supplied control-plane endpoint override, otherwise
/// derives the endpoint from ready control-plane `Beskar7Machine`s.
async fn reconcile_endpoint(
    cluster: &Beskar7Cluster,
    status: &mut Beskar7ClusterStatus,
    ctx: &Context,
    namespace: &str,
) -> Result<Duration, ControllerError> {
    if let Some(endpoint) = cluster.spec.control_plane_endpoint.clone() {
        status.control_plane_endpoint = Some(endpoint);
        upsert_condition(
            &mut status.conditions,
            Condition::ready(CONTROL_PLANE_ENDPOINT_READY_CONDITION, Utc::now()),
        );
        return Ok(DEFAULT_RECONCILE_REQUEUE);
    }

    let machines: Api<Beskar7Machine> = Api::namespaced(ctx.client.clone(), namespace);
    let list = machines.list(&ListParams::default()).await?;
    let cluster_name = cluster.metadata.name.as_deref().unwrap_or_default();

    match select_control_plane_endpoint(&list.items, cluster_name) {
        Some(endpoint) => {
            info!(cluster = %cluster_name, host = %endpoint.host, "control-plane endpoint discovered");
            status.control_plane_endpoint = Some(endpoint);
            upsert_condition(
                &mut status.conditions,
                Condition::ready(CONTROL_PLANE_ENDPOINT_READY_CONDITION, Utc::now()),
            );
            Ok(DEFAULT_RECONCILE_REQUEUE)
        }
        None => {
            status.control_plane_endpoint = None;
            upsert_condition(
                &mut status.conditions,
                Condition::not_ready(
                    CONTROL_PLANE_ENDPOINT_READY_CONDITION,
                    ConditionSeverity::Info,
                    REASON_NOT_SET,
                    "no ready control-plane machine exposes an address yet",
                    Utc::now(),
                ),
            );
            Ok(ENDPOINT_NOT_SET_REQUEUE)
        }
    }
}

/// Aggregates failure domains from the topology label on every
/// `PhysicalHost` in the cluster's namespace. Skips the status write
/// when the aggregate is unchanged, to avoid write amplification.
async fn reconcile_failure_domains(
    cluster: &Beskar7Cluster,
    status: &mut Beskar7ClusterStatus,
    ctx: &Context,
    namespace: &str,
) -> Result<(), ControllerError> {
    let hosts: Api<PhysicalHost> = Api::namespaced(ctx.client.clone(), namespace);
    let list = hosts.list(&ListParams::default()).await?;

    let domains = extract_failure_domains(&list.items, cluster.spec.topology_label_key());
    let aggregated = aggregate_failure_domains(&domains);

    if aggregated != status.failure_domains {
        status.failure_domains = aggregated;
    }
    Ok(())
}

async fn handle_deletion(api: &Api<Beskar7Cluster>, cluster: &Beskar7Cluster) -> Result<Action, ControllerError> {
    let name = cluster.metadata.name.clone().unwrap_or_default();
    if !has_finalizer(cluster) {
        return Ok(Action::await_change());
    }

    api.patch(
        &name,
        &PatchParams::default(),
        &Patch::Merge(json!({
            "metadata": { "finalizers": [] }
        })),
    )
    .await?;

    info!(cluster = %name, "finalizer removed, cluster deleted");
    Ok(Action::await_change())
}

/// The `kube_runtime::Controller` catch-all for reconcile errors: transient
/// failures (optimistic-concurrency conflicts surfaced as `kube::Error`) are
/// requeued with a fixed backoff.
pub fn error_policy(_cluster: Arc<Beskar7Cluster>, err: &ControllerError, _ctx: Arc<Context>) -> Action {
    warn!(error = %err, "reconcile error, requeuing");
    Action::requeue(Duration::from_secs(30))
}

fn is_paused(cluster: &Beskar7Cluster) -> bool {
    cluster
        .metadata
        .annotations
        .as_ref()
        .is_some_and(|a| a.contains_key(PAUSED_ANNOTATION))
}

fn has_finalizer(cluster: &Beskar7Cluster) -> bool {
    cluster
        .metadata
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|s| s == CLUSTER_FINALIZER))
}

async fn patch_status(
    api: &Api<Beskar7Cluster>,
    name: &str,
    status: &Beskar7ClusterStatus,
) -> Result<Beskar7Cluster, ControllerError> {
    Ok(api
        .patch_status(
            name,
            &PatchParams::default(),
            &Patch::Merge(json!({ "status": status })),
        )
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn cluster_with_annotations(annotations: BTreeMap<String, String>) -> Beskar7Cluster {
        Beskar7Cluster {
            metadata: ObjectMeta {
                annotations: Some(annotations),
                ..Default::default()
            },
            spec: crds::cluster::Beskar7ClusterSpec {
                control_plane_endpoint: None,
                topology_label_key: None,
            },
            status: None,
        }
    }

    #[test]
    fn detects_paused_annotation() {
        let mut annotations = BTreeMap::new();
        annotations.insert(PAUSED_ANNOTATION.to_string(), "true".to_string());
        assert!(is_paused(&cluster_with_annotations(annotations)));
    }

    #[test]
    fn not_paused_without_annotation() {
        assert!(!is_paused(&cluster_with_annotations(BTreeMap::new())));
    }

    #[test]
    fn lacks_finalizer_by_default() {
        assert!(!has_finalizer(&cluster_with_annotations(BTreeMap::new())));
    }
}
