//! Applies a resolved `BootParamMechanism` to a BMC.
//!
//! Kept in the `bmc` crate (rather than a controller) since it is pure BMC
//! orchestration: given a mechanism and a parameter list, it knows which
//! Redfish calls to issue. Vendor/mechanism *resolution* from a manufacturer
//! string plus annotation overrides lives in `vendor.rs`; this module only
//! executes the decision.

use crate::bmc_trait::BmcClient;
use crate::error::BmcError;
use crate::models::{ApplyTime, BootSource};
use crate::vendor::{requires_on_reset_apply, BootParamMechanism, Vendor};
use tracing::warn;

/// Write `params` to the host via `mechanism`, falling back to
/// `BootParamMechanism::UefiTarget` if the preferred mechanism fails or is
/// declared-but-unimplemented ("On failure of the preferred
/// mechanism, fall back to UEFI target").
///
/// `image_url` is concatenated into the UEFI target string as the boot path;
/// an empty `params` list clears any previously written override/attribute.
pub async fn apply_boot_parameters(
    bmc: &dyn BmcClient,
    vendor: Vendor,
    mechanism: &BootParamMechanism,
    params: &[String],
    image_url: &str,
) -> Result<(), BmcError> {
    match mechanism {
        BootParamMechanism::BiosAttribute { attribute } => {
            apply_bios_attribute(bmc, vendor, attribute, params).await
        }
        BootParamMechanism::UefiTarget => apply_uefi_target(bmc, params, image_url).await,
        BootParamMechanism::BootOptions | BootParamMechanism::Unsupported => {
            warn!(?mechanism, "mechanism unimplemented, falling back to UEFI target");
            apply_uefi_target(bmc, params, image_url).await
        }
    }
}

async fn apply_bios_attribute(
    bmc: &dyn BmcClient,
    vendor: Vendor,
    attribute: &str,
    params: &[String],
) -> Result<(), BmcError> {
    let apply_time = if requires_on_reset_apply(vendor) {
        ApplyTime::OnReset
    } else {
        ApplyTime::Immediate
    };
    let value = params.join(" ");
    match bmc.set_bios_attribute(attribute, &value, apply_time).await {
        Ok(()) => Ok(()),
        Err(err) => {
            warn!(attribute, error = %err, "BIOS attribute write failed, falling back to UEFI target");
            apply_uefi_target(bmc, params, "").await
        }
    }
}

async fn apply_uefi_target(bmc: &dyn BmcClient, params: &[String], image_url: &str) -> Result<(), BmcError> {
    if params.is_empty() {
        // Empty parameter list disables the override.
        return bmc.set_boot_source(BootSource::None).await;
    }
    let target = if image_url.is_empty() {
        params.join(" ")
    } else {
        format!("{image_url} {}", params.join(" "))
    };
    bmc.set_boot_source(BootSource::UefiTarget(target)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bmc_trait::BmcClient as _;
    use crate::mock::MockBmcClient;
    use crate::models::SystemInfo;

    #[tokio::test]
    async fn bios_attribute_mechanism_writes_joined_params() {
        let mock = MockBmcClient::new("https://bmc", SystemInfo::default());
        let mechanism = BootParamMechanism::BiosAttribute {
            attribute: "KernelArgs".to_string(),
        };
        apply_boot_parameters(
            &mock,
            Vendor::Dell,
            &mechanism,
            &["talos.config=http://x/m.yaml".to_string()],
            "http://x/talos.iso",
        )
        .await
        .unwrap();
        assert_eq!(
            mock.get_bios_attribute("KernelArgs").await.unwrap().as_deref(),
            Some("talos.config=http://x/m.yaml")
        );
    }

    #[tokio::test]
    async fn uefi_target_mechanism_concatenates_image_and_params() {
        let mock = MockBmcClient::new("https://bmc", SystemInfo::default());
        apply_boot_parameters(
            &mock,
            Vendor::Hpe,
            &BootParamMechanism::UefiTarget,
            &["talos.config=http://x/m.yaml".to_string()],
            "http://x/talos.iso",
        )
        .await
        .unwrap();
        assert_eq!(
            mock.last_boot_source(),
            Some(BootSource::UefiTarget(
                "http://x/talos.iso talos.config=http://x/m.yaml".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn empty_params_clears_uefi_override() {
        let mock = MockBmcClient::new("https://bmc", SystemInfo::default());
        apply_boot_parameters(&mock, Vendor::Generic, &BootParamMechanism::UefiTarget, &[], "http://x/image.iso")
            .await
            .unwrap();
        assert_eq!(mock.last_boot_source(), Some(BootSource::None));
    }

    #[tokio::test]
    async fn boot_options_mechanism_falls_back_to_uefi_target() {
        let mock = MockBmcClient::new("https://bmc", SystemInfo::default());
        apply_boot_parameters(
            &mock,
            Vendor::Generic,
            &BootParamMechanism::BootOptions,
            &["config_url=http://x/m.yaml".to_string()],
            "http://x/image.iso",
        )
        .await
        .unwrap();
        assert_eq!(
            mock.last_boot_source(),
            Some(BootSource::UefiTarget("http://x/image.iso config_url=http://x/m.yaml".to_string()))
        );
    }
}
