//! The inspection callback's wire payload and its conversion into the
//! `PhysicalHost` status shape.

use crate::error::SinkError;
use crds::physical_host::{CpuInfo, DiskInfo, HardwareDetails, InspectionReport, MemoryInfo, NicInfo};
use serde::Deserialize;

/// `POST /api/v1/inspection` request body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionReportPayload {
    pub namespace: String,
    pub host_name: String,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub cpus: Vec<CpuPayload>,
    #[serde(default)]
    pub memory: Vec<MemoryPayload>,
    #[serde(default)]
    pub disks: Vec<DiskPayload>,
    #[serde(default)]
    pub nics: Vec<NicPayload>,
    #[serde(default)]
    pub boot_mode_detected: Option<String>,
    #[serde(default)]
    pub firmware_version: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuPayload {
    pub model: String,
    pub cores: u32,
    #[serde(default)]
    pub threads: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryPayload {
    pub size_mib: u64,
    #[serde(default)]
    pub type_: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskPayload {
    pub name: String,
    pub size_gib: u64,
    #[serde(default)]
    pub media_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NicPayload {
    pub name: String,
    #[serde(default)]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub speed_mbps: Option<u64>,
}

impl InspectionReportPayload {
    /// Rejects a report missing `namespace` or `hostName`.
    pub fn validate_identity(&self) -> Result<(), SinkError> {
        if self.namespace.is_empty() {
            return Err(SinkError::MissingIdentity("namespace"));
        }
        if self.host_name.is_empty() {
            return Err(SinkError::MissingIdentity("hostName"));
        }
        Ok(())
    }

    /// Hardware identity fields reported alongside the inspection report,
    /// merged onto `PhysicalHostStatus.hardware` by the caller.
    #[must_use]
    pub fn hardware_details(&self) -> HardwareDetails {
        HardwareDetails {
            manufacturer: self.manufacturer.clone(),
            model: self.model.clone(),
            serial_number: self.serial_number.clone(),
            health: None,
        }
    }

    /// Convert the wire payload into the host's `InspectionReport` status shape.
    #[must_use]
    pub fn to_inspection_report(&self) -> InspectionReport {
        InspectionReport {
            cpus: self
                .cpus
                .iter()
                .map(|c| CpuInfo {
                    model: c.model.clone(),
                    cores: c.cores,
                    threads: c.threads,
                })
                .collect(),
            memory: self
                .memory
                .iter()
                .map(|m| MemoryInfo {
                    size_mib: m.size_mib,
                    type_: m.type_.clone(),
                })
                .collect(),
            disks: self
                .disks
                .iter()
                .map(|d| DiskInfo {
                    name: d.name.clone(),
                    size_gib: d.size_gib,
                    media_type: d.media_type.clone(),
                })
                .collect(),
            nics: self
                .nics
                .iter()
                .map(|n| NicInfo {
                    name: n.name.clone(),
                    mac_address: n.mac_address.clone(),
                    speed_mbps: n.speed_mbps,
                })
                .collect(),
            boot_mode_detected: self.boot_mode_detected.clone(),
            firmware_version: self.firmware_version.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> InspectionReportPayload {
        InspectionReportPayload {
            namespace: "default".to_string(),
            host_name: "host-1".to_string(),
            manufacturer: Some("Dell Inc.".to_string()),
            model: Some("PowerEdge R640".to_string()),
            serial_number: Some("ABC123".to_string()),
            cpus: vec![CpuPayload {
                model: "Xeon".to_string(),
                cores: 16,
                threads: 32,
            }],
            memory: vec![MemoryPayload {
                size_mib: 65536,
                type_: Some("DDR4".to_string()),
            }],
            disks: vec![DiskPayload {
                name: "sda".to_string(),
                size_gib: 512,
                media_type: Some("SSD".to_string()),
            }],
            nics: vec![NicPayload {
                name: "eth0".to_string(),
                mac_address: Some("00:11:22:33:44:55".to_string()),
                speed_mbps: Some(10000),
            }],
            boot_mode_detected: Some("UEFI".to_string()),
            firmware_version: Some("2.1.0".to_string()),
        }
    }

    #[test]
    fn validate_identity_accepts_complete_payload() {
        assert!(payload().validate_identity().is_ok());
    }

    #[test]
    fn validate_identity_rejects_missing_namespace() {
        let mut p = payload();
        p.namespace.clear();
        assert!(matches!(
            p.validate_identity(),
            Err(SinkError::MissingIdentity("namespace"))
        ));
    }

    #[test]
    fn validate_identity_rejects_missing_host_name() {
        let mut p = payload();
        p.host_name.clear();
        assert!(matches!(
            p.validate_identity(),
            Err(SinkError::MissingIdentity("hostName"))
        ));
    }

    #[test]
    fn converts_full_payload() {
        let report = payload().to_inspection_report();
        assert_eq!(report.total_cores(), 16);
        assert_eq!(report.total_memory_mib(), 65536);
        assert_eq!(report.total_disk_gib(), 512);
        assert_eq!(report.nics.len(), 1);
        assert_eq!(report.boot_mode_detected.as_deref(), Some("UEFI"));
    }

    #[test]
    fn hardware_details_carries_manufacturer_fields() {
        let details = payload().hardware_details();
        assert_eq!(details.manufacturer.as_deref(), Some("Dell Inc."));
        assert_eq!(details.model.as_deref(), Some("PowerEdge R640"));
        assert_eq!(details.serial_number.as_deref(), Some("ABC123"));
    }
}
