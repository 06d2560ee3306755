//! `PhysicalHost` — a bare-metal server under BMC management.

use crate::conditions::Condition;
use crate::references::{ConsumerRef, SecretReference};
use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Finalizer stamped on every `PhysicalHost` until BMC cleanup has run.
pub const PHYSICAL_HOST_FINALIZER: &str = "physicalhost.infrastructure.cluster.x-k8s.io";

/// A bare-metal server reachable over Redfish.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1alpha1",
    kind = "PhysicalHost",
    plural = "physicalhosts",
    namespaced,
    status = "PhysicalHostStatus",
    shortname = "phost"
)]
#[serde(rename_all = "camelCase")]
pub struct PhysicalHostSpec {
    /// BMC connection details.
    pub bmc: BmcDetails,

    /// The machine currently bound to this host, if any. Set only by the
    /// claim coordinator or on release; see invariant (ii) in 
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_ref: Option<ConsumerRef>,

    /// Image URL handed to firmware as the boot target once provisioning begins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_image_url: Option<String>,
}

/// BMC endpoint and credentials.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BmcDetails {
    /// Redfish service root URL, e.g. `https://10.0.0.5`.
    pub address: String,

    /// Secret holding `username`/`password` keys.
    pub credentials_secret_ref: SecretReference,

    /// Skip TLS certificate verification for this host's BMC.
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
}

/// `PhysicalHost` lifecycle state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum HostPhase {
    /// Just enrolled; credentials and BMC reachability not yet confirmed.
    #[default]
    Enrolling,
    /// Reachable, healthy, and unclaimed.
    Available,
    /// A consumer reference has been set; inspection not yet begun.
    Claimed,
    /// Booted into the inspection image, awaiting a report.
    Inspecting,
    /// Inspection satisfied the consumer's hardware requirements.
    Ready,
    /// Boot configuration for the target image has been issued.
    Provisioning,
    /// The target boot completed and the host is provider-visible.
    Provisioned,
    /// Being released back to the pool or torn down.
    Deprovisioning,
    /// Terminal until externally cleared.
    Error,
}

/// Observed BMC power state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum PowerState {
    /// System is powered on.
    On,
    /// System is powered off.
    Off,
    /// Power state could not be determined.
    Unknown,
}

/// Inspection progress, independent of the overall host phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum InspectionPhase {
    /// Inspection has not started.
    #[default]
    Pending,
    /// Inspection boot source/power-on has been issued.
    Booting,
    /// Booted and waiting on the report.
    InProgress,
    /// A report was received and accepted.
    Complete,
    /// The inspection timeout elapsed with no report.
    Timeout,
}

/// Hardware identity, as reported by the BMC's system-info endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HardwareDetails {
    /// Manufacturer string, used for vendor detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,
}

/// Minimum resources a consumer needs; checked against the inspection report.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HardwareRequirements {
    /// Minimum CPU core count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_cores: Option<u32>,
    /// Minimum memory, in MiB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_memory_mib: Option<u64>,
    /// Minimum disk capacity, in GiB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_disk_gib: Option<u64>,
}

/// One CPU socket/package as reported by inspection.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CpuInfo {
    pub model: String,
    pub cores: u32,
    pub threads: u32,
}

/// One memory module/bank as reported by inspection.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MemoryInfo {
    pub size_mib: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
}

/// One disk/drive as reported by inspection.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DiskInfo {
    pub name: String,
    pub size_gib: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

/// One network interface as reported by inspection.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NicInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_mbps: Option<u64>,
}

/// Hardware inventory captured by the inspection sink.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InspectionReport {
    #[serde(default)]
    pub cpus: Vec<CpuInfo>,
    #[serde(default)]
    pub memory: Vec<MemoryInfo>,
    #[serde(default)]
    pub disks: Vec<DiskInfo>,
    #[serde(default)]
    pub nics: Vec<NicInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_mode_detected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
}

impl InspectionReport {
    /// Total memory across all reported modules, in MiB.
    #[must_use]
    pub fn total_memory_mib(&self) -> u64 {
        self.memory.iter().map(|m| m.size_mib).sum()
    }

    /// Total disk capacity across all reported drives, in GiB.
    #[must_use]
    pub fn total_disk_gib(&self) -> u64 {
        self.disks.iter().map(|d| d.size_gib).sum()
    }

    /// Total CPU core count across all reported sockets.
    #[must_use]
    pub fn total_cores(&self) -> u32 {
        self.cpus.iter().map(|c| c.cores).sum()
    }

    /// Whether this report satisfies the given hardware requirements.
    #[must_use]
    pub fn satisfies(&self, requirements: &HardwareRequirements) -> bool {
        requirements
            .min_cores
            .is_none_or(|min| self.total_cores() >= min)
            && requirements
                .min_memory_mib
                .is_none_or(|min| self.total_memory_mib() >= min)
            && requirements
                .min_disk_gib
                .is_none_or(|min| self.total_disk_gib() >= min)
    }
}

/// IP version of a discovered network address.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum AddressFamily {
    V4,
    V6,
}

/// A network address discovered on the host, classified internal/external.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkAddress {
    pub family: AddressFamily,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    /// True for RFC 1918 / RFC 4193 private ranges; see 
    pub is_internal: bool,
}

/// Observed state of a `PhysicalHost`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct PhysicalHostStatus {
    #[serde(default)]
    pub state: HostPhase,

    /// Timestamp `state` last changed; used to detect a host stuck in a
    /// non-terminal state past `stuckStateTimeout`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_entered_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub ready: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_state: Option<PowerState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware: Option<HardwareDetails>,

    #[serde(default)]
    pub inspection_phase: InspectionPhase,

    /// Timestamp the host entered `InspectionPhase::Booting`; used to detect
    /// the inspection timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspection_started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspection_report: Option<InspectionReport>,

    #[serde(default)]
    pub addresses: Vec<NetworkAddress>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Consecutive BMC connection failures since the last success; reset to
    /// zero on a successful connect. Compared against the transient-retry
    /// budget (3, per §4.1) before a connection failure is allowed to move
    /// the host to `Error`.
    #[serde(default)]
    pub connection_retry_count: u32,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconciled: Option<DateTime<Utc>>,
}

impl PhysicalHostStatus {
    /// Invariant (i) of : consumer-bearing states.
    #[must_use]
    pub fn requires_consumer(&self) -> bool {
        matches!(
            self.state,
            HostPhase::Claimed
                | HostPhase::Inspecting
                | HostPhase::Ready
                | HostPhase::Provisioning
                | HostPhase::Provisioned
                | HostPhase::Deprovisioning
        )
    }

    /// Move to `new_state`, stamping `state_entered_at` only on an actual
    /// change so repeated reconciles of a stable state don't reset the
    /// stuck-state clock.
    pub fn transition_to(&mut self, new_state: HostPhase, now: DateTime<Utc>) {
        if self.state != new_state {
            self.state = new_state;
            self.state_entered_at = Some(now);
        }
    }

    /// True once a working (non-resting) state has held longer than
    /// `timeout` with no external signal to advance it
    /// ("a stuck state beyond `stuckStateTimeout`").
    #[must_use]
    pub fn is_stuck(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
        matches!(
            self.state,
            HostPhase::Claimed | HostPhase::Provisioning | HostPhase::Deprovisioning
        ) && self
            .state_entered_at
            .is_some_and(|entered| now.signed_duration_since(entered) >= timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inspection_report_satisfies_matching_requirements() {
        let report = InspectionReport {
            cpus: vec![CpuInfo {
                model: "x".to_string(),
                cores: 16,
                threads: 32,
            }],
            memory: vec![MemoryInfo {
                size_mib: 65536,
                type_: None,
            }],
            disks: vec![DiskInfo {
                name: "sda".to_string(),
                size_gib: 512,
                media_type: None,
            }],
            nics: vec![],
            boot_mode_detected: None,
            firmware_version: None,
        };
        let requirements = HardwareRequirements {
            min_cores: Some(8),
            min_memory_mib: Some(32768),
            min_disk_gib: Some(256),
        };
        assert!(report.satisfies(&requirements));
    }

    #[test]
    fn inspection_report_rejects_insufficient_memory() {
        let report = InspectionReport {
            memory: vec![MemoryInfo {
                size_mib: 8192,
                type_: None,
            }],
            ..Default::default()
        };
        let requirements = HardwareRequirements {
            min_memory_mib: Some(32768),
            ..Default::default()
        };
        assert!(!report.satisfies(&requirements));
    }

    #[test]
    fn requires_consumer_matches_spec_invariant() {
        assert!(!PhysicalHostStatus {
            state: HostPhase::Available,
            ..Default::default()
        }
        .requires_consumer());
        assert!(PhysicalHostStatus {
            state: HostPhase::Provisioning,
            ..Default::default()
        }
        .requires_consumer());
    }

    #[test]
    fn transition_to_stamps_entered_at_only_on_change() {
        let t0 = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let t1 = t0 + chrono::Duration::minutes(5);

        let mut status = PhysicalHostStatus {
            state: HostPhase::Available,
            ..Default::default()
        };
        status.transition_to(HostPhase::Claimed, t0);
        assert_eq!(status.state_entered_at, Some(t0));

        status.transition_to(HostPhase::Claimed, t1);
        assert_eq!(status.state_entered_at, Some(t0));
    }

    #[test]
    fn is_stuck_after_timeout_in_working_state() {
        let t0 = Utc::now();
        let status = PhysicalHostStatus {
            state: HostPhase::Provisioning,
            state_entered_at: Some(t0 - chrono::Duration::minutes(10)),
            ..Default::default()
        };
        assert!(status.is_stuck(t0, chrono::Duration::minutes(5)));
        assert!(!status.is_stuck(t0, chrono::Duration::minutes(20)));
    }

    #[test]
    fn is_stuck_false_for_resting_states() {
        let t0 = Utc::now();
        let status = PhysicalHostStatus {
            state: HostPhase::Available,
            state_entered_at: Some(t0 - chrono::Duration::hours(1)),
            ..Default::default()
        };
        assert!(!status.is_stuck(t0, chrono::Duration::minutes(5)));
    }
}
