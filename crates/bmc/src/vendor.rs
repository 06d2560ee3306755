//! Vendor detection and boot-parameter mechanism selection.

use std::collections::BTreeMap;

/// A recognized server manufacturer, detected from the Redfish `Manufacturer`
/// string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Vendor {
    Dell,
    Hpe,
    Lenovo,
    Supermicro,
    Generic,
}

/// How kernel/boot parameters are written onto a given vendor's firmware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootParamMechanism {
    /// One-shot UEFI boot target concatenated with space-separated parameters.
    UefiTarget,
    /// A single BIOS attribute holding the space-joined parameter string.
    BiosAttribute { attribute: String },
    /// Select from a firmware-enumerated list of boot options. Reserved as a
    /// future extension point; applying it is a typed error for now.
    BootOptions,
    /// No mechanism available.
    Unsupported,
}

/// Static policy for one vendor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorPolicy {
    pub mechanism: BootParamMechanism,
    pub requires_bios_attribute: bool,
}

/// Annotation forcing a specific mechanism, highest precedence.
pub const ANNOTATION_BOOT_PARAMETER_MECHANISM: &str =
    "beskar7.infrastructure.cluster.x-k8s.io/boot-parameter-mechanism";
/// Annotation overriding the BIOS attribute name, implies the BIOS mechanism.
pub const ANNOTATION_BIOS_KERNEL_ARG_ATTRIBUTE: &str =
    "beskar7.infrastructure.cluster.x-k8s.io/bios-kernel-arg-attribute";

/// Detect a vendor from a Redfish `Manufacturer` string. Matching is
/// case-insensitive and substring-based, since BMCs report brand strings with
/// inconsistent suffixes (e.g. "Dell Inc.", "HPE", "Hewlett Packard Enterprise").
#[must_use]
pub fn vendor_from_manufacturer(manufacturer: &str) -> Vendor {
    let lower = manufacturer.to_lowercase();
    if lower.contains("dell") {
        Vendor::Dell
    } else if lower.contains("hpe") || lower.contains("hewlett packard enterprise") {
        Vendor::Hpe
    } else if lower.contains("lenovo") {
        Vendor::Lenovo
    } else if lower.contains("supermicro") {
        Vendor::Supermicro
    } else {
        Vendor::Generic
    }
}

/// Static policy table: preferred mechanism and BIOS-attribute requirement
/// per vendor.
#[must_use]
pub fn policy_for(vendor: Vendor) -> VendorPolicy {
    match vendor {
        Vendor::Dell => VendorPolicy {
            mechanism: BootParamMechanism::BiosAttribute {
                attribute: "KernelArgs".to_string(),
            },
            requires_bios_attribute: true,
        },
        Vendor::Supermicro => VendorPolicy {
            mechanism: BootParamMechanism::BiosAttribute {
                attribute: "KernelArgs".to_string(),
            },
            requires_bios_attribute: true,
        },
        Vendor::Hpe | Vendor::Lenovo | Vendor::Generic => VendorPolicy {
            mechanism: BootParamMechanism::UefiTarget,
            requires_bios_attribute: false,
        },
    }
}

/// Apply-time semantics for a BIOS attribute write, per vendor
/// ("Dell uses an OnReset apply-time; others auto-apply").
#[must_use]
pub fn requires_on_reset_apply(vendor: Vendor) -> bool {
    matches!(vendor, Vendor::Dell)
}

/// Resolve the effective mechanism for a machine, honoring annotation
/// overrides in this precedence order:
/// explicit mechanism annotation > BIOS attribute-name annotation (implies
/// BIOS mechanism) > vendor-detected policy.
#[must_use]
pub fn resolve_mechanism(
    vendor: Vendor,
    annotations: &BTreeMap<String, String>,
) -> BootParamMechanism {
    if let Some(forced) = annotations.get(ANNOTATION_BOOT_PARAMETER_MECHANISM) {
        return match forced.as_str() {
            "uefi-target" => BootParamMechanism::UefiTarget,
            "bios-attribute" => BootParamMechanism::BiosAttribute {
                attribute: annotations
                    .get(ANNOTATION_BIOS_KERNEL_ARG_ATTRIBUTE)
                    .cloned()
                    .unwrap_or_else(|| policy_for(vendor).bios_attribute_name()),
            },
            "boot-options" => BootParamMechanism::BootOptions,
            _ => BootParamMechanism::Unsupported,
        };
    }

    if let Some(attribute) = annotations.get(ANNOTATION_BIOS_KERNEL_ARG_ATTRIBUTE) {
        return BootParamMechanism::BiosAttribute {
            attribute: attribute.clone(),
        };
    }

    policy_for(vendor).mechanism
}

impl VendorPolicy {
    fn bios_attribute_name(&self) -> String {
        match &self.mechanism {
            BootParamMechanism::BiosAttribute { attribute } => attribute.clone(),
            _ => "KernelArgs".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_known_vendors() {
        assert_eq!(vendor_from_manufacturer("Dell Inc."), Vendor::Dell);
        assert_eq!(vendor_from_manufacturer("HPE"), Vendor::Hpe);
        assert_eq!(
            vendor_from_manufacturer("Hewlett Packard Enterprise"),
            Vendor::Hpe
        );
        assert_eq!(vendor_from_manufacturer("Lenovo"), Vendor::Lenovo);
        assert_eq!(vendor_from_manufacturer("Supermicro"), Vendor::Supermicro);
        assert_eq!(vendor_from_manufacturer("Acme Corp"), Vendor::Generic);
    }

    #[test]
    fn dell_and_supermicro_use_bios_attribute() {
        assert_eq!(
            policy_for(Vendor::Dell).mechanism,
            BootParamMechanism::BiosAttribute {
                attribute: "KernelArgs".to_string()
            }
        );
        assert!(requires_on_reset_apply(Vendor::Dell));
        assert!(!requires_on_reset_apply(Vendor::Supermicro));
    }

    #[test]
    fn hpe_lenovo_generic_use_uefi_target() {
        assert_eq!(policy_for(Vendor::Hpe).mechanism, BootParamMechanism::UefiTarget);
        assert_eq!(policy_for(Vendor::Lenovo).mechanism, BootParamMechanism::UefiTarget);
        assert_eq!(policy_for(Vendor::Generic).mechanism, BootParamMechanism::UefiTarget);
    }

    #[test]
    fn mechanism_annotation_overrides_vendor_policy() {
        let mut annotations = BTreeMap::new();
        annotations.insert(
            ANNOTATION_BOOT_PARAMETER_MECHANISM.to_string(),
            "bios-attribute".to_string(),
        );
        assert_eq!(
            resolve_mechanism(Vendor::Hpe, &annotations),
            BootParamMechanism::BiosAttribute {
                attribute: "KernelArgs".to_string()
            }
        );
    }

    #[test]
    fn bios_attribute_annotation_implies_bios_mechanism_without_forcing() {
        let mut annotations = BTreeMap::new();
        annotations.insert(
            ANNOTATION_BIOS_KERNEL_ARG_ATTRIBUTE.to_string(),
            "CustomArgs".to_string(),
        );
        assert_eq!(
            resolve_mechanism(Vendor::Hpe, &annotations),
            BootParamMechanism::BiosAttribute {
                attribute: "CustomArgs".to_string()
            }
        );
    }

    #[test]
    fn no_annotations_falls_back_to_vendor_policy() {
        assert_eq!(
            resolve_mechanism(Vendor::Dell, &BTreeMap::new()),
            BootParamMechanism::BiosAttribute {
                attribute: "KernelArgs".to_string()
            }
        );
    }
}
