//! `Beskar7Machine` — the Cluster-API infrastructure machine bound to a
//! `PhysicalHost`.

use crate::conditions::Condition;
use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Finalizer stamped on every `Beskar7Machine` until its host claim has been released.
pub const MACHINE_FINALIZER: &str = "beskar7machine.infrastructure.cluster.x-k8s.io";

/// Operating system a `Beskar7Machine` boots, keying the kernel-parameter
/// table for `ProvisioningMode::RemoteConfig`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum OsFamily {
    Kairos,
    Talos,
    Flatcar,
    LeapMicro,
}

/// How `image_url` is turned into a running system.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum ProvisioningMode {
    /// The image alone boots into a final, self-configuring system.
    PreBakedISO,
    /// The image is a generic installer; a kernel parameter points it at
    /// `remote_config_url` for OS-specific configuration.
    RemoteConfig,
}

/// `Beskar7Machine` desired state.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1alpha1",
    kind = "Beskar7Machine",
    plural = "beskar7machines",
    namespaced,
    status = "Beskar7MachineStatus",
    shortname = "b7m"
)]
#[serde(rename_all = "camelCase")]
pub struct Beskar7MachineSpec {
    /// Image URL handed to firmware as the boot target.
    pub image_url: String,

    /// Operating system family, selecting the `RemoteConfig` kernel parameter.
    pub os_family: OsFamily,

    /// Whether `image_url` is a final image or a generic installer that needs
    /// `remote_config_url`.
    pub provisioning_mode: ProvisioningMode,

    /// Config (ignition/cloud-init-equivalent) URL. Required when
    /// `provisioning_mode` is `RemoteConfig`; validated, not schema-enforced,
    /// since `kube::CustomResource` does not generate cross-field CRD
    /// validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_config_url: Option<String>,

    /// Minimum hardware a claimed host must report at inspection time.
    #[serde(default)]
    pub hardware_requirements: crate::physical_host::HardwareRequirements,
}

/// `Beskar7Machine` lifecycle phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum MachinePhase {
    /// No host has been claimed yet.
    #[default]
    Pending,
    /// A host has been claimed but has not begun inspection.
    Associating,
    /// The bound host is being inspected.
    Inspecting,
    /// Boot configuration has been applied; the bound host is provisioning.
    Provisioning,
    /// The bound host finished provisioning and is provider-visible.
    Provisioned,
    /// The bound host or the claim failed irrecoverably.
    Failed,
}

/// Observed state of a `Beskar7Machine`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct Beskar7MachineStatus {
    #[serde(default)]
    pub phase: MachinePhase,

    #[serde(default)]
    pub ready: bool,

    /// `beskar7://<namespace>/<hostname>` of the claimed host, set once bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,

    /// Name of the claimed `PhysicalHost` in this namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_host_ref: Option<String>,

    /// Network addresses copied from the bound host's status once claimed
    /// ("network addresses (copied from bound host)").
    #[serde(default)]
    pub addresses: Vec<crate::physical_host::NetworkAddress>,

    /// True once vendor-aware boot parameters have been committed to the
    /// bound host's firmware, so steady-state reconciles don't re-issue the
    /// same BMC writes.
    #[serde(default)]
    pub boot_configured: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconciled: Option<DateTime<Utc>>,
}

impl Beskar7MachineSpec {
    /// Invariant (iii) of : `RemoteConfig` requires a non-empty
    /// `remote_config_url`. `PreBakedISO` ignores it.
    #[must_use]
    pub fn validate(&self) -> Result<(), String> {
        if matches!(self.provisioning_mode, ProvisioningMode::RemoteConfig)
            && self.remote_config_url.as_deref().unwrap_or("").is_empty()
        {
            return Err(
                "remoteConfigURL is required when provisioningMode is RemoteConfig".to_string(),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_phase_is_pending() {
        assert_eq!(Beskar7MachineStatus::default().phase, MachinePhase::Pending);
    }

    fn spec(mode: ProvisioningMode, remote_config_url: Option<&str>) -> Beskar7MachineSpec {
        Beskar7MachineSpec {
            image_url: "http://x/image.iso".to_string(),
            os_family: OsFamily::Talos,
            provisioning_mode: mode,
            remote_config_url: remote_config_url.map(str::to_string),
            hardware_requirements: crate::physical_host::HardwareRequirements::default(),
        }
    }

    #[test]
    fn remote_config_requires_url() {
        assert!(spec(ProvisioningMode::RemoteConfig, None).validate().is_err());
        assert!(spec(ProvisioningMode::RemoteConfig, Some("")).validate().is_err());
        assert!(spec(ProvisioningMode::RemoteConfig, Some("http://x/m.yaml"))
            .validate()
            .is_ok());
    }

    #[test]
    fn pre_baked_iso_does_not_require_url() {
        assert!(spec(ProvisioningMode::PreBakedISO, None).validate().is_ok());
    }
}
