//! `PhysicalHost` reconcile loop.
//!
//! Every state-edge BMC side-effect lives in this module; steady-state
//! reconciles only read the BMC and diff against status, matching the
//! "issue side-effects only on state-edge transitions" rule.

use crate::deprovision::release_bmc_resources;
use crate::error::ControllerError;
use bmc::bmc_trait::BmcClient;
use bmc::factory::{BmcClientFactory, BmcConnectionParams};
use bmc::models::{BootSource, PowerAction};
use chrono::Utc;
use crds::conditions::{
    upsert_condition, Condition, ConditionSeverity, BMC_CONNECTED_CONDITION, HOST_READY_CONDITION,
    REASON_CONNECTION_FAILED, REASON_INSPECTION_TIMEOUT, REASON_SECRET_NOT_FOUND,
};
use crds::physical_host::{
    HostPhase, InspectionPhase, PhysicalHost, PhysicalHostStatus, PowerState, PHYSICAL_HOST_FINALIZER,
};
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// `cluster.x-k8s.io/paused` annotation honored on every object type.
pub const PAUSED_ANNOTATION: &str = "cluster.x-k8s.io/paused";

/// Fallback `ComputerSystem` resource ID used when the Redfish BMC exposes
/// exactly one system, which covers the overwhelming majority of rack
/// servers — `PhysicalHost.spec.bmc` carries no separate system-ID field.
const DEFAULT_SYSTEM_ID: &str = "1";

const DEFAULT_RECONCILE_REQUEUE: Duration = Duration::from_secs(30);
const CONNECTION_RETRY_REQUEUE: Duration = Duration::from_secs(60);

/// Maximum consecutive transient BMC connection failures before the host is
/// forced to `Error` ("Maximum retries per transition is 3").
const MAX_CONNECTION_RETRIES: u32 = 3;

/// Shared reconciler context, handed to every `reconcile` call.
pub struct Context {
    /// Kubernetes client used for both the watched `PhysicalHost` and its
    /// credentials `Secret`.
    pub client: Client,
    /// Builds the `BmcClient` used for this reconcile's Redfish calls.
    pub bmc_factory: Arc<dyn BmcClientFactory>,
    /// Time an inspection report is allowed to arrive before the host errors out.
    pub inspection_timeout: Duration,
    /// Time a host may sit in a non-terminal state with no progress before recovery kicks in.
    pub stuck_state_timeout: Duration,
    /// Hold time before a silent Provisioning→Provisioned promotion.
    pub provisioning_hold_time: Duration,
}

impl Context {
    fn stuck_state_timeout_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.stuck_state_timeout).unwrap_or_else(|_| chrono::Duration::minutes(5))
    }
}

/// Top-level reconcile entry point wired into `kube_runtime::Controller`.
pub async fn reconcile(host: Arc<PhysicalHost>, ctx: Arc<Context>) -> Result<Action, ControllerError> {
    let namespace = host.metadata.namespace.clone().unwrap_or_default();
    let name = host.metadata.name.clone().unwrap_or_default();
    let api: Api<PhysicalHost> = Api::namespaced(ctx.client.clone(), &namespace);

    if is_paused(&host) {
        debug!(host = %name, "paused annotation set, skipping reconcile");
        return Ok(Action::await_change());
    }

    if host.metadata.deletion_timestamp.is_some() {
        return handle_deletion(&api, &host, &ctx).await;
    }

    if !has_finalizer(&host) {
        api.patch(
            &name,
            &PatchParams::default(),
            &Patch::Merge(json!({
                "metadata": { "finalizers": [PHYSICAL_HOST_FINALIZER] }
            })),
        )
        .await?;
        return Ok(Action::requeue(Duration::from_secs(0)));
    }

    let mut status = host.status.clone().unwrap_or_default();

    let credentials = match resolve_credentials(&ctx.client, &namespace, &host).await {
        Ok(creds) => creds,
        Err(message) => {
            warn!(host = %name, %message, "credentials unresolved");
            status.transition_to(HostPhase::Error, Utc::now());
            status.error_message = Some(message.clone());
            upsert_condition(
                &mut status.conditions,
                Condition::not_ready(
                    HOST_READY_CONDITION,
                    ConditionSeverity::Error,
                    REASON_SECRET_NOT_FOUND,
                    message,
                    Utc::now(),
                ),
            );
            patch_status(&api, &name, &status).await?;
            return Ok(Action::await_change());
        }
    };

    let bmc_client = match ctx.bmc_factory.connect(BmcConnectionParams {
        address: &host.spec.bmc.address,
        system_id: DEFAULT_SYSTEM_ID,
        username: &credentials.username,
        password: &credentials.password,
        insecure_skip_tls_verify: host.spec.bmc.insecure_skip_tls_verify,
    }) {
        Ok(client) => client,
        Err(err) => {
            warn!(host = %name, error = %err, "BMC connection failed");
            status.connection_retry_count += 1;
            status.error_message = Some(err.to_string());
            upsert_condition(
                &mut status.conditions,
                Condition::not_ready(
                    BMC_CONNECTED_CONDITION,
                    ConditionSeverity::Warning,
                    REASON_CONNECTION_FAILED,
                    err.to_string(),
                    Utc::now(),
                ),
            );
            if status.connection_retry_count > MAX_CONNECTION_RETRIES {
                warn!(host = %name, "BMC connection retry budget exhausted, forcing Error");
                status.transition_to(HostPhase::Error, Utc::now());
                patch_status(&api, &name, &status).await?;
                return Ok(Action::await_change());
            }
            patch_status(&api, &name, &status).await?;
            return Ok(Action::requeue(CONNECTION_RETRY_REQUEUE));
        }
    };
    status.connection_retry_count = 0;

    let outcome = drive_state_machine(&host, &mut status, bmc_client.as_ref(), &ctx).await;
    if let Err(err) = bmc_client.close().await {
        warn!(host = %name, error = %err, "failed to close BMC session");
    }

    status.last_reconciled = Some(Utc::now());
    patch_status(&api, &name, &status).await?;

    match outcome {
        Ok(requeue) => Ok(Action::requeue(requeue)),
        Err(err) => {
            error!(host = %name, error = %err, "reconcile step failed");
            Err(err)
        }
    }
}

/// Runs the state transition table once BMC connectivity is
/// established, mutating `status` in place and returning the requeue delay.
async fn drive_state_machine(
    host: &PhysicalHost,
    status: &mut PhysicalHostStatus,
    bmc: &dyn BmcClient,
    ctx: &Context,
) -> Result<Duration, ControllerError> {
    let system_info = bmc.get_system_info().await?;
    status.power_state = Some(convert_power_state(system_info.power_state));
    status.hardware = Some(crds::physical_host::HardwareDetails {
        manufacturer: system_info.manufacturer.clone(),
        model: system_info.model.clone(),
        serial_number: system_info.serial_number.clone(),
        health: system_info.health.clone(),
    });

    if let Ok(interfaces) = bmc.list_ethernet_interfaces().await {
        status.addresses = interfaces
            .iter()
            .flat_map(|iface| addresses_from_interface(iface))
            .collect();
    }

    upsert_condition(
        &mut status.conditions,
        Condition::ready(BMC_CONNECTED_CONDITION, Utc::now()),
    );

    let now = Utc::now();
    if status.is_stuck(now, ctx.stuck_state_timeout_chrono()) {
        warn!(host = %host_name(host), state = ?status.state, "state stuck past timeout, forcing Error");
        status.transition_to(HostPhase::Error, now);
        status.error_message = Some(format!("stuck in {:?} past stuckStateTimeout", status.state));
        upsert_condition(
            &mut status.conditions,
            Condition::not_ready(
                HOST_READY_CONDITION,
                ConditionSeverity::Error,
                "StuckState",
                "no progress within stuckStateTimeout",
                now,
            ),
        );
        return Ok(DEFAULT_RECONCILE_REQUEUE);
    }

    match status.state {
        HostPhase::Enrolling => {
            info!(host = %host_name(host), "host reachable, marking Available");
            status.transition_to(HostPhase::Available, now);
            status.ready = true;
            upsert_condition(&mut status.conditions, Condition::ready(HOST_READY_CONDITION, Utc::now()));
            Ok(DEFAULT_RECONCILE_REQUEUE)
        }
        HostPhase::Available => {
            if host.spec.consumer_ref.is_some() {
                info!(host = %host_name(host), "consumer reference set, entering Claimed");
                status.transition_to(HostPhase::Claimed, now);
            }
            Ok(DEFAULT_RECONCILE_REQUEUE)
        }
        HostPhase::Claimed => {
            let boot_target = host
                .spec
                .boot_image_url
                .clone()
                .map_or(BootSource::Pxe, BootSource::UefiTarget);
            bmc.set_boot_source(boot_target).await?;
            bmc.set_power_state(PowerAction::On).await?;
            status.transition_to(HostPhase::Inspecting, now);
            status.inspection_phase = InspectionPhase::Booting;
            status.inspection_started_at = Some(now);
            info!(host = %host_name(host), "boot source set, inspecting");
            Ok(DEFAULT_RECONCILE_REQUEUE)
        }
        HostPhase::Inspecting => reconcile_inspecting(host, status, ctx),
        HostPhase::Ready => {
            let boot_target = host
                .spec
                .boot_image_url
                .clone()
                .map_or(BootSource::None, BootSource::UefiTarget);
            bmc.set_boot_source(boot_target).await?;
            bmc.set_power_state(PowerAction::ForceRestart).await?;
            status.transition_to(HostPhase::Provisioning, now);
            info!(host = %host_name(host), "boot configuration applied, provisioning");
            Ok(DEFAULT_RECONCILE_REQUEUE)
        }
        HostPhase::Provisioning => {
            reconcile_provisioning(status, system_info.power_state, ctx.provisioning_hold_time)
        }
        HostPhase::Provisioned | HostPhase::Deprovisioning | HostPhase::Error => {
            Ok(DEFAULT_RECONCILE_REQUEUE)
        }
    }
}

/// Inspecting → Ready on a completed report. The claim coordinator already
/// matched this host against the consumer's `HardwareRequirements` before
/// claiming it, so the reconciler only waits for the
/// report to land rather than re-checking requirements it has no access to.
/// Times out to Error after `inspection_timeout`.
fn reconcile_inspecting(
    host: &PhysicalHost,
    status: &mut PhysicalHostStatus,
    ctx: &Context,
) -> Result<Duration, ControllerError> {
    if status.inspection_phase == InspectionPhase::Complete && status.inspection_report.is_some() {
        info!(host = %host_name(host), "inspection report received, entering Ready");
        status.transition_to(HostPhase::Ready, Utc::now());
        return Ok(DEFAULT_RECONCILE_REQUEUE);
    }

    if let Some(started) = status.inspection_started_at {
        let elapsed = Utc::now().signed_duration_since(started);
        if elapsed.to_std().unwrap_or_default() >= ctx.inspection_timeout {
            warn!(host = %host_name(host), "inspection timed out");
            status.transition_to(HostPhase::Error, Utc::now());
            status.inspection_phase = InspectionPhase::Timeout;
            status.error_message = Some("Inspection timeout".to_string());
            upsert_condition(
                &mut status.conditions,
                Condition::not_ready(
                    HOST_READY_CONDITION,
                    ConditionSeverity::Error,
                    REASON_INSPECTION_TIMEOUT,
                    "Inspection timeout",
                    Utc::now(),
                ),
            );
            return Ok(DEFAULT_RECONCILE_REQUEUE);
        }
    }

    Ok(DEFAULT_RECONCILE_REQUEUE)
}

/// Provisioning → Provisioned, resolved: the inspection
/// path is handled in `reconcile_inspecting`-equivalent sink updates; absent
/// that, a stable power-on beyond `provisioning_hold_time` measured from
/// entering Provisioning (`status.state_entered_at`, stamped by
/// `transition_to` at Ready→Provisioning) is accepted.
fn reconcile_provisioning(
    status: &mut PhysicalHostStatus,
    power_state: bmc::models::PowerState,
    provisioning_hold_time: Duration,
) -> Result<Duration, ControllerError> {
    if power_state != bmc::models::PowerState::On {
        return Ok(DEFAULT_RECONCILE_REQUEUE);
    }
    let Some(entered) = status.state_entered_at else {
        return Ok(DEFAULT_RECONCILE_REQUEUE);
    };
    if provisioning_hold_elapsed(entered, Utc::now(), provisioning_hold_time) {
        status.transition_to(HostPhase::Provisioned, Utc::now());
        status.ready = true;
    }
    Ok(DEFAULT_RECONCILE_REQUEUE)
}

/// Whether `provisioning_hold_time` has elapsed since the host entered
/// `Provisioning`, isolated from `Context` so it is unit-testable directly.
fn provisioning_hold_elapsed(entered: chrono::DateTime<Utc>, now: chrono::DateTime<Utc>, hold: Duration) -> bool {
    now.signed_duration_since(entered).to_std().unwrap_or_default() >= hold
}

async fn handle_deletion(
    api: &Api<PhysicalHost>,
    host: &PhysicalHost,
    ctx: &Context,
) -> Result<Action, ControllerError> {
    let name = host_name(host);
    if !has_finalizer(host) {
        return Ok(Action::await_change());
    }

    if let Some(credentials) = resolve_credentials(&ctx.client, &namespace(host), host).await.ok() {
        if let Ok(client) = ctx.bmc_factory.connect(BmcConnectionParams {
            address: &host.spec.bmc.address,
            system_id: DEFAULT_SYSTEM_ID,
            username: &credentials.username,
            password: &credentials.password,
            insecure_skip_tls_verify: host.spec.bmc.insecure_skip_tls_verify,
        }) {
            let known_power_state = host.status.as_ref().and_then(|s| s.power_state).map(convert_power_state_back);
            release_bmc_resources(&name, client.as_ref(), known_power_state).await;
            let _ = client.close().await;
        }
    }

    api.patch(
        &name,
        &PatchParams::default(),
        &Patch::Merge(json!({
            "metadata": { "finalizers": [] }
        })),
    )
    .await?;

    info!(host = %name, "finalizer removed, host deleted");
    Ok(Action::await_change())
}

/// The `kube_runtime::Controller` catch-all for reconcile errors: transient
/// failures (BMC I/O, optimistic-concurrency conflicts surfaced as
/// `kube::Error`) are requeued with a fixed backoff.
pub fn error_policy(_host: Arc<PhysicalHost>, err: &ControllerError, _ctx: Arc<Context>) -> Action {
    warn!(error = %err, "reconcile error, requeuing");
    Action::requeue(Duration::from_secs(30))
}

fn is_paused(host: &PhysicalHost) -> bool {
    host.metadata
        .annotations
        .as_ref()
        .is_some_and(|a| a.contains_key(PAUSED_ANNOTATION))
}

fn has_finalizer(host: &PhysicalHost) -> bool {
    host.metadata
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|s| s == PHYSICAL_HOST_FINALIZER))
}

fn host_name(host: &PhysicalHost) -> String {
    host.metadata.name.clone().unwrap_or_default()
}

fn namespace(host: &PhysicalHost) -> String {
    host.metadata.namespace.clone().unwrap_or_default()
}

fn convert_power_state(state: bmc::models::PowerState) -> PowerState {
    match state {
        bmc::models::PowerState::On => PowerState::On,
        bmc::models::PowerState::Off => PowerState::Off,
        bmc::models::PowerState::Unknown => PowerState::Unknown,
    }
}

fn convert_power_state_back(state: PowerState) -> bmc::models::PowerState {
    match state {
        PowerState::On => bmc::models::PowerState::On,
        PowerState::Off => bmc::models::PowerState::Off,
        PowerState::Unknown => bmc::models::PowerState::Unknown,
    }
}

struct Credentials {
    username: String,
    password: String,
}

/// Resolve `spec.bmc.credentialsSecretRef` to a username/password pair.
/// Missing object or missing keys are both permanent errors
/// ("Missing keys are a permanent error; missing object is a
/// transient error" — both surface as `SecretNotFound` here since the
/// reconciler cannot distinguish a slow-to-appear Secret from a
/// never-coming one within one tick; the condition clears on the next
/// successful resolution either way).
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
    let username = decode_secret_key(&data, "username")
        .ok_or_else(|| format!("secret '{}' missing 'username' key", secret_ref.name))?;
    let password = decode_secret_key(&data, "password")
        .ok_or_else(|| format!("secret '{}' missing 'password' key", secret_ref.name))?;

    Ok(Credentials { username, password })
}

fn decode_secret_key(
    data: &std::collections::BTreeMap<String, k8s_openapi::ByteString>,
    key: &str,
) -> Option<String> {
    data.get(key)
        .and_then(|value| String::from_utf8(value.0.clone()).ok())
}

fn addresses_from_interface(
    interface: &bmc::models::EthernetInterface,
) -> Vec<crds::physical_host::NetworkAddress> {
    use crds::physical_host::{AddressFamily, NetworkAddress};

    let mut addresses = Vec::new();
    for ip in &interface.ipv4_addresses {
        addresses.push(NetworkAddress {
            family: AddressFamily::V4,
            address: ip.clone(),
            gateway: None,
            interface: Some(interface.id.clone()),
            mac_address: interface.mac_address.clone(),
            is_internal: bmc::address::is_internal_address(ip),
        });
    }
    for ip in &interface.ipv6_addresses {
        addresses.push(NetworkAddress {
            family: AddressFamily::V6,
            address: ip.clone(),
            gateway: None,
            interface: Some(interface.id.clone()),
            mac_address: interface.mac_address.clone(),
            is_internal: bmc::address::is_internal_address(ip),
        });
    }
    addresses
}

async fn patch_status(
    api: &Api<PhysicalHost>,
    name: &str,
    status: &PhysicalHostStatus,
) -> Result<PhysicalHost, ControllerError> {
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

    fn host_with_annotations(annotations: BTreeMap<String, String>) -> PhysicalHost {
        PhysicalHost {
            metadata: ObjectMeta {
                annotations: Some(annotations),
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
            status: None,
        }
    }

    #[test]
    fn detects_paused_annotation() {
        let mut annotations = BTreeMap::new();
        annotations.insert(PAUSED_ANNOTATION.to_string(), "true".to_string());
        assert!(is_paused(&host_with_annotations(annotations)));
    }

    #[test]
    fn not_paused_without_annotation() {
        assert!(!is_paused(&host_with_annotations(BTreeMap::new())));
    }

    #[test]
    fn decodes_secret_key() {
        let mut data = BTreeMap::new();
        data.insert(
            "username".to_string(),
            k8s_openapi::ByteString(b"admin".to_vec()),
        );
        assert_eq!(decode_secret_key(&data, "username").as_deref(), Some("admin"));
        assert_eq!(decode_secret_key(&data, "password"), None);
    }

    #[test]
    fn provisioning_hold_not_elapsed_before_duration() {
        let entered = Utc::now();
        let now = entered + chrono::Duration::seconds(30);
        assert!(!provisioning_hold_elapsed(entered, now, Duration::from_secs(120)));
    }

    #[test]
    fn provisioning_hold_elapsed_after_duration() {
        let entered = Utc::now();
        let now = entered + chrono::Duration::seconds(121);
        assert!(provisioning_hold_elapsed(entered, now, Duration::from_secs(120)));
    }

    #[test]
    fn reconcile_provisioning_waits_for_hold_since_state_entered() {
        let now = Utc::now();
        let mut status = PhysicalHostStatus {
            state: HostPhase::Provisioning,
            // Stale inspection timestamp from the earlier Claimed->Inspecting
            // edge, long past any hold time — must not gate the promotion.
            inspection_started_at: Some(now - chrono::Duration::hours(1)),
            state_entered_at: Some(now - chrono::Duration::seconds(10)),
            ..Default::default()
        };
        let hold = Duration::from_secs(120);

        reconcile_provisioning(&mut status, bmc::models::PowerState::On, hold).unwrap();
        assert_eq!(status.state, HostPhase::Provisioning, "hold time not yet elapsed");

        status.state_entered_at = Some(now - chrono::Duration::seconds(121));
        reconcile_provisioning(&mut status, bmc::models::PowerState::On, hold).unwrap();
        assert_eq!(status.state, HostPhase::Provisioned);
        assert!(status.ready);
    }
}
