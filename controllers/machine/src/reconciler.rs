//! `Beskar7Machine` reconcile loop.
//!
//! Binds a machine to a host via the claim coordinator, commits vendor-aware
//! boot configuration once at bind time, and mirrors the bound host's
//! lifecycle onto the machine's own status.

use crate::boot_config::compute_kernel_params;
use crate::error::ControllerError;
use bmc::factory::{BmcClientFactory, BmcConnectionParams};
use bmc::vendor::{resolve_mechanism, vendor_from_manufacturer};
use chrono::Utc;
use claim_coordinator::ClaimCoordinator;
use crds::conditions::{
    upsert_condition, Condition, ConditionSeverity, INFRASTRUCTURE_READY_CONDITION,
    PHYSICAL_HOST_ASSOCIATED_CONDITION, REASON_WAITING_FOR_PHYSICAL_HOST,
};
use crds::machine::{Beskar7Machine, Beskar7MachineStatus, MachinePhase, MACHINE_FINALIZER};
use crds::physical_host::{HostPhase, PhysicalHost};
use crds::provider_id::ProviderId;
use crds::references::ConsumerRef;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::Client;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// `cluster.x-k8s.io/paused` annotation honored on every object type.
pub const PAUSED_ANNOTATION: &str = "cluster.x-k8s.io/paused";

const DEFAULT_RECONCILE_REQUEUE: Duration = Duration::from_secs(30);
const OWNER_WAIT_REQUEUE: Duration = Duration::from_secs(10);
const CLAIM_RETRY_REQUEUE: Duration = Duration::from_secs(15);
const PROVISIONED_RECONFIRM_REQUEUE: Duration = Duration::from_secs(60);

/// Fallback `ComputerSystem` resource ID, matching `physicalhost-controller`'s
/// own default (`PhysicalHost.spec.bmc` carries no separate system-ID field).
const DEFAULT_SYSTEM_ID: &str = "1";

/// Shared reconciler context, handed to every `reconcile` call.
pub struct Context {
    /// Kubernetes client used for the watched `Beskar7Machine`, its bound
    /// `PhysicalHost`, and the host's credentials `Secret`.
    pub client: Client,
    /// Builds the `BmcClient` used to commit boot configuration directly to
    /// the bound host.
    pub bmc_factory: Arc<dyn BmcClientFactory>,
}

/// Top-level reconcile entry point wired into `kube_runtime::Controller`.
pub async fn reconcile(machine: Arc<Beskar7Machine>, ctx: Arc<Context>) -> Result<Action, ControllerError> {
    let namespace = machine.metadata.namespace.clone().unwrap_or_default();
    let name = machine.metadata.name.clone().unwrap_or_default();
    let api: Api<Beskar7Machine> = Api::namespaced(ctx.client.clone(), &namespace);

    if is_paused(&machine) {
        debug!(machine = %name, "paused annotation set, skipping reconcile");
        return Ok(Action::await_change());
    }

    if machine.metadata.deletion_timestamp.is_some() {
        return handle_deletion(&api, &machine, &ctx).await;
    }

    if !has_finalizer(&machine) {
        api.patch(
            &name,
            &PatchParams::default(),
            &Patch::Merge(json!({
                "metadata": { "finalizers": [MACHINE_FINALIZER] }
            })),
        )
        .await?;
        return Ok(Action::requeue(Duration::from_secs(0)));
    }

    // The owning Cluster-API `Machine`/`Cluster` objects are opaque inputs
    // ("consumed as opaque inputs"); the only thing this
    // reconciler needs from them is that linkage having been established at
    // all, surfaced here as the presence of any owner reference.
    if machine.metadata.owner_references.as_ref().is_none_or(Vec::is_empty) {
        debug!(machine = %name, "no owner reference yet, requeuing");
        return Ok(Action::requeue(OWNER_WAIT_REQUEUE));
    }

    let mut status = machine.status.clone().unwrap_or_default();

    if let Err(message) = machine.spec.validate() {
        warn!(machine = %name, %message, "invalid machine spec");
        status.phase = MachinePhase::Failed;
        status.ready = false;
        status.failure_message = Some(message);
        patch_status(&api, &name, &status).await?;
        return Ok(Action::await_change());
    }

    let outcome = drive_binding(&machine, &namespace, &name, &mut status, &ctx).await;

    status.last_reconciled = Some(Utc::now());
    patch_status(&api, &name, &status).await?;

    match outcome {
        Ok(requeue) => Ok(Action::requeue(requeue)),
        Err(err) => {
            warn!(machine = %name, error = %err, "reconcile step failed");
            Err(err)
        }
    }
}

/// Obtains the bound host (claiming one if needed), applies boot
/// configuration once, and mirrors the host's lifecycle onto `status`.
async fn drive_binding(
    machine: &Beskar7Machine,
    namespace: &str,
    name: &str,
    status: &mut Beskar7MachineStatus,
    ctx: &Context,
) -> Result<Duration, ControllerError> {
    let hosts: Api<PhysicalHost> = Api::namespaced(ctx.client.clone(), namespace);

    let host = match obtain_host(machine, namespace, name, status, &hosts, ctx).await? {
        Some(host) => host,
        None => {
            upsert_condition(
                &mut status.conditions,
                Condition::not_ready(
                    PHYSICAL_HOST_ASSOCIATED_CONDITION,
                    ConditionSeverity::Warning,
                    REASON_WAITING_FOR_PHYSICAL_HOST,
                    "no PhysicalHost currently satisfies selection",
                    Utc::now(),
                ),
            );
            status.phase = MachinePhase::Pending;
            status.ready = false;
            return Ok(CLAIM_RETRY_REQUEUE);
        }
    };

    upsert_condition(
        &mut status.conditions,
        Condition::ready(PHYSICAL_HOST_ASSOCIATED_CONDITION, Utc::now()),
    );

    let host_status = host.status.clone().unwrap_or_default();

    if !status.boot_configured
        && matches!(
            host_status.state,
            HostPhase::Available | HostPhase::Claimed | HostPhase::Inspecting
        )
    {
        if let Err(err) = apply_boot_configuration(machine, &host, ctx).await {
            warn!(machine = %name, host = %host_name(&host), error = %err, "boot configuration failed");
            return Err(err);
        }
        status.boot_configured = true;
    }

    Ok(mirror_host_state(status, namespace, &host, &host_status))
}

/// Branches on the bound host's lifecycle state.
fn mirror_host_state(
    status: &mut Beskar7MachineStatus,
    namespace: &str,
    host: &PhysicalHost,
    host_status: &crds::physical_host::PhysicalHostStatus,
) -> Duration {
    match host_status.state {
        HostPhase::Available | HostPhase::Claimed | HostPhase::Enrolling => {
            status.phase = MachinePhase::Associating;
            status.ready = false;
            upsert_condition(
                &mut status.conditions,
                Condition::not_ready(
                    INFRASTRUCTURE_READY_CONDITION,
                    ConditionSeverity::Info,
                    "Associating",
                    "host claimed, inspection not yet begun",
                    Utc::now(),
                ),
            );
            DEFAULT_RECONCILE_REQUEUE
        }
        HostPhase::Inspecting => {
            status.phase = MachinePhase::Inspecting;
            status.ready = false;
            DEFAULT_RECONCILE_REQUEUE
        }
        HostPhase::Ready => {
            // Boot configuration is already committed to firmware by
            // `apply_boot_configuration`; the host's own reconciler issues
            // the Ready→Provisioning power cycle on its next tick using the
            // boot target already set.
            status.phase = MachinePhase::Provisioning;
            status.ready = false;
            DEFAULT_RECONCILE_REQUEUE
        }
        HostPhase::Provisioning => {
            status.phase = MachinePhase::Provisioning;
            status.ready = false;
            DEFAULT_RECONCILE_REQUEUE
        }
        HostPhase::Provisioned => {
            let provider_id = ProviderId {
                namespace: namespace.to_string(),
                host_name: host_name(host),
            };
            status.provider_id = Some(provider_id.format());
            status.addresses = host_status.addresses.clone();
            status.phase = MachinePhase::Provisioned;
            status.ready = true;
            upsert_condition(
                &mut status.conditions,
                Condition::ready(INFRASTRUCTURE_READY_CONDITION, Utc::now()),
            );
            PROVISIONED_RECONFIRM_REQUEUE
        }
        HostPhase::Deprovisioning => {
            status.phase = MachinePhase::Associating;
            status.ready = false;
            DEFAULT_RECONCILE_REQUEUE
        }
        HostPhase::Error => {
            status.phase = MachinePhase::Failed;
            status.ready = false;
            status.failure_message = host_status.error_message.clone();
            upsert_condition(
                &mut status.conditions,
                Condition::not_ready(
                    INFRASTRUCTURE_READY_CONDITION,
                    ConditionSeverity::Error,
                    "PhysicalHostError",
                    host_status
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "bound host entered Error".to_string()),
                    Utc::now(),
                ),
            );
            DEFAULT_RECONCILE_REQUEUE
        }
    }
}

/// Resolves the bound host via `status.physical_host_ref`, or claims a new
/// one via the coordinator when unbound.
async fn obtain_host(
    machine: &Beskar7Machine,
    namespace: &str,
    name: &str,
    status: &mut Beskar7MachineStatus,
    hosts: &Api<PhysicalHost>,
    ctx: &Context,
) -> Result<Option<PhysicalHost>, ControllerError> {
    if let Some(provider_id) = status.provider_id.as_deref() {
        if ProviderId::parse(provider_id).is_err() {
            warn!(machine = %name, provider_id, "invalid provider ID, clearing and re-entering selection");
            status.provider_id = None;
            status.physical_host_ref = None;
        }
    }

    if let Some(host_name) = status.physical_host_ref.clone() {
        match hosts.get(&host_name).await {
            Ok(host) => {
                let bound_to_this_machine = host
                    .spec
                    .consumer_ref
                    .as_ref()
                    .is_some_and(|c| c.matches(namespace, name));
                if bound_to_this_machine {
                    return Ok(Some(host));
                }
                warn!(machine = %name, host = %host_name, "host no longer bound to this machine, re-entering selection");
                status.physical_host_ref = None;
                status.provider_id = None;
            }
            Err(kube::Error::Api(err)) if err.code == 404 => {
                warn!(machine = %name, host = %host_name, "bound host missing, re-entering selection");
                status.physical_host_ref = None;
                status.provider_id = None;
            }
            Err(err) => return Err(err.into()),
        }
    }

    let consumer = consumer_ref_for(machine, namespace, name);

    let coordinator = ClaimCoordinator::new(ctx.client.clone(), namespace);
    match coordinator
        .claim(&consumer, &machine.spec.hardware_requirements, Some(&machine.spec.image_url))
        .await
    {
        Ok(host) => {
            info!(machine = %name, host = %host_name(&host), "claimed physical host");
            status.physical_host_ref = Some(host_name(&host));
            Ok(Some(host))
        }
        Err(claim_coordinator::ClaimError::NoHostAvailable) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Commits vendor-aware boot configuration to the bound host's firmware,
/// once per claim.
async fn apply_boot_configuration(
    machine: &Beskar7Machine,
    host: &PhysicalHost,
    ctx: &Context,
) -> Result<(), ControllerError> {
    let params = compute_kernel_params(
        machine.spec.provisioning_mode,
        machine.spec.os_family,
        machine.spec.remote_config_url.as_deref(),
    )
    .map_err(|err| ControllerError::InvalidSpec(err.to_string()))?;

    let manufacturer = host
        .status
        .as_ref()
        .and_then(|s| s.hardware.as_ref())
        .and_then(|h| h.manufacturer.as_deref())
        .unwrap_or("");
    let vendor = vendor_from_manufacturer(manufacturer);
    let empty_annotations = BTreeMap::new();
    let annotations = machine.metadata.annotations.as_ref().unwrap_or(&empty_annotations);
    let mechanism = resolve_mechanism(vendor, annotations);

    let namespace = host.metadata.namespace.clone().unwrap_or_default();
    let credentials = resolve_credentials(&ctx.client, &namespace, host)
        .await
        .map_err(ControllerError::InvalidSpec)?;

    let bmc_client = ctx.bmc_factory.connect(BmcConnectionParams {
        address: &host.spec.bmc.address,
        system_id: DEFAULT_SYSTEM_ID,
        username: &credentials.username,
        password: &credentials.password,
        insecure_skip_tls_verify: host.spec.bmc.insecure_skip_tls_verify,
    })?;

    let result = bmc::apply_boot_parameters(
        bmc_client.as_ref(),
        vendor,
        &mechanism,
        &params,
        &machine.spec.image_url,
    )
    .await;

    if let Err(err) = bmc_client.close().await {
        warn!(host = %host_name(host), error = %err, "failed to close BMC session after boot configuration");
    }

    info!(
        machine = %machine.metadata.name.clone().unwrap_or_default(),
        host = %host_name(host),
        ?mechanism,
        "applied boot configuration"
    );

    result.map_err(ControllerError::from)
}

async fn handle_deletion(
    api: &Api<Beskar7Machine>,
    machine: &Beskar7Machine,
    ctx: &Context,
) -> Result<Action, ControllerError> {
    let name = machine.metadata.name.clone().unwrap_or_default();
    let namespace = machine.metadata.namespace.clone().unwrap_or_default();

    if !has_finalizer(machine) {
        return Ok(Action::await_change());
    }

    if let Some(host_name) = machine
        .status
        .as_ref()
        .and_then(|s| s.physical_host_ref.clone())
    {
        let consumer = consumer_ref_for(machine, &namespace, &name);
        let coordinator = ClaimCoordinator::new(ctx.client.clone(), &namespace);
        if let Err(err) = coordinator.release(&host_name, &consumer).await {
            warn!(machine = %name, host = %host_name, error = %err, "release failed during deletion, removing finalizer anyway");
        }
    }

    api.patch(
        &name,
        &PatchParams::default(),
        &Patch::Merge(json!({ "metadata": { "finalizers": [] } })),
    )
    .await?;

    info!(machine = %name, "finalizer removed, machine deleted");
    Ok(Action::await_change())
}

/// The `kube_runtime::Controller` catch-all for reconcile errors: transient
/// failures (BMC I/O, claim conflicts) are requeued with a fixed backoff.
pub fn error_policy(_machine: Arc<Beskar7Machine>, err: &ControllerError, _ctx: Arc<Context>) -> Action {
    warn!(error = %err, "reconcile error, requeuing");
    Action::requeue(Duration::from_secs(30))
}

fn is_paused(machine: &Beskar7Machine) -> bool {
    machine
        .metadata
        .annotations
        .as_ref()
        .is_some_and(|a| a.contains_key(PAUSED_ANNOTATION))
}

fn has_finalizer(machine: &Beskar7Machine) -> bool {
    machine
        .metadata
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|s| s == MACHINE_FINALIZER))
}

fn host_name(host: &PhysicalHost) -> String {
    host.metadata.name.clone().unwrap_or_default()
}

fn consumer_ref_for(machine: &Beskar7Machine, namespace: &str, name: &str) -> ConsumerRef {
    ConsumerRef {
        api_version: "infrastructure.cluster.x-k8s.io/v1alpha1".to_string(),
        kind: "Beskar7Machine".to_string(),
        name: name.to_string(),
        namespace: namespace.to_string(),
        uid: machine.metadata.uid.clone().unwrap_or_default(),
    }
}

struct Credentials {
    username: String,
    password: String,
}

/// Resolve a `PhysicalHost`'s `credentialsSecretRef` to a username/password
/// pair. Mirrors `physicalhost-controller::reconciler::resolve_credentials`;
/// duplicated here since each controller binary owns its own BMC session.
async fn resolve_credentials(
    client: &Client,
    namespace: &str,
    host: &PhysicalHost,
) -> Result<Credentials, String> {
    let secret_ref = &host.spec.bmc.credentials_secret_ref;
    let secret_namespace = secret_ref.namespace.as_deref().unwrap_or(namespace);
    let secrets: Api<Secret> = Api::namespaced(client.clone(), secret_namespace);
    let secret = secrets
        .get(&secret_ref.name)
        .await
        .map_err(|err| format!("secret '{}' not found: {err}", secret_ref.name))?;

    let data = secret.data.unwrap_or_default();
    let username = data
        .get("username")
        .and_then(|v| String::from_utf8(v.0.clone()).ok())
        .ok_or_else(|| format!("secret '{}' missing 'username' key", secret_ref.name))?;
    let password = data
        .get("password")
        .and_then(|v| String::from_utf8(v.0.clone()).ok())
        .ok_or_else(|| format!("secret '{}' missing 'password' key", secret_ref.name))?;

    Ok(Credentials { username, password })
}

async fn patch_status(
    api: &Api<Beskar7Machine>,
    name: &str,
    status: &Beskar7MachineStatus,
) -> Result<Beskar7Machine, ControllerError> {
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
    use crds::machine::{Beskar7MachineSpec, OsFamily, ProvisioningMode};
    use crds::physical_host::HardwareRequirements;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn machine_with_annotations(annotations: BTreeMap<String, String>) -> Beskar7Machine {
        Beskar7Machine {
            metadata: ObjectMeta {
                annotations: Some(annotations),
                ..Default::default()
            },
            spec: Beskar7MachineSpec {
                image_url: "http://x/image.iso".to_string(),
                os_family: OsFamily::Talos,
                provisioning_mode: ProvisioningMode::PreBakedISO,
                remote_config_url: None,
                hardware_requirements: HardwareRequirements::default(),
            },
            status: None,
        }
    }

    #[test]
    fn detects_paused_annotation() {
        let mut annotations = BTreeMap::new();
        annotations.insert(PAUSED_ANNOTATION.to_string(), "true".to_string());
        assert!(is_paused(&machine_with_annotations(annotations)));
    }

    #[test]
    fn not_paused_without_annotation() {
        assert!(!is_paused(&machine_with_annotations(BTreeMap::new())));
    }

    #[test]
    fn mirror_host_state_provisioned_sets_provider_id() {
        let host = PhysicalHost {
            metadata: ObjectMeta {
                name: Some("host-7".to_string()),
                ..Default::default()
            },
            spec: crds::physical_host::PhysicalHostSpec {
                bmc: crds::physical_host::BmcDetails {
                    address: "https://bmc".to_string(),
                    credentials_secret_ref: crds::references::SecretReference {
                        name: "creds".to_string(),
                        namespace: None,
                    },
                    insecure_skip_tls_verify: false,
                },
                consumer_ref: None,
                boot_image_url: None,
            },
            status: Some(crds::physical_host::PhysicalHostStatus {
                state: HostPhase::Provisioned,
                ..Default::default()
            }),
        };
        let host_status = host.status.clone().unwrap();
        let mut status = Beskar7MachineStatus::default();
        mirror_host_state(&mut status, "prod", &host, &host_status);
        assert_eq!(status.provider_id.as_deref(), Some("beskar7://prod/host-7"));
        assert!(status.ready);
        assert_eq!(status.phase, MachinePhase::Provisioned);
    }

    #[test]
    fn mirror_host_state_error_propagates_failure_message() {
        let host = PhysicalHost {
            metadata: ObjectMeta {
                name: Some("host-7".to_string()),
                ..Default::default()
            },
            spec: crds::physical_host::PhysicalHostSpec {
                bmc: crds::physical_host::BmcDetails {
                    address: "https://bmc".to_string(),
                    credentials_secret_ref: crds::references::SecretReference {
                        name: "creds".to_string(),
                        namespace: None,
                    },
                    insecure_skip_tls_verify: false,
                },
                consumer_ref: None,
                boot_image_url: None,
            },
            status: Some(crds::physical_host::PhysicalHostStatus {
                state: HostPhase::Error,
                error_message: Some("Inspection timeout".to_string()),
                ..Default::default()
            }),
        };
        let host_status = host.status.clone().unwrap();
        let mut status = Beskar7MachineStatus::default();
        mirror_host_state(&mut status, "prod", &host, &host_status);
        assert_eq!(status.phase, MachinePhase::Failed);
        assert_eq!(status.failure_message.as_deref(), Some("Inspection timeout"));
    }
}
