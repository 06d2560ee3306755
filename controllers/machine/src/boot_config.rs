//! Pure boot-configuration computation, kept free of any Kubernetes/BMC
//! dependency so the kernel-parameter table can be unit-tested directly.
//!
//! An unknown OS family under `RemoteConfig` is a permanent configuration
//! error; `OsFamily` is a closed enum covering exactly the four supported
//! families, so that case is precluded at the type level — an unrecognized
//! family fails CRD/serde validation before reaching here.

use crds::machine::{OsFamily, ProvisioningMode};
use thiserror::Error;

/// Errors computing a machine's boot configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BootConfigError {
    /// `RemoteConfig` was requested with no `remote_config_url` set.
    #[error("RemoteConfig provisioning mode requires a non-empty remoteConfigURL")]
    MissingRemoteConfigUrl,
}

/// The kernel-parameter table, keyed by OS family.
#[must_use]
pub fn remote_config_kernel_param(os_family: OsFamily, url: &str) -> Result<String, BootConfigError> {
    Ok(match os_family {
        OsFamily::Kairos => format!("config_url={url}"),
        OsFamily::Talos => format!("talos.config={url}"),
        OsFamily::Flatcar => format!("flatcar.ignition.config.url={url}"),
        OsFamily::LeapMicro => format!("combustion.path={url}"),
    })
}

/// Compute the kernel parameters a `Beskar7Machine` needs written to its
/// bound host's firmware: empty for `PreBakedISO` ("the image alone boots
/// into a final system"), a single computed parameter for `RemoteConfig`.
pub fn compute_kernel_params(
    mode: ProvisioningMode,
    os_family: OsFamily,
    remote_config_url: Option<&str>,
) -> Result<Vec<String>, BootConfigError> {
    match mode {
        ProvisioningMode::PreBakedISO => Ok(Vec::new()),
        ProvisioningMode::RemoteConfig => {
            let url = remote_config_url
                .filter(|u| !u.is_empty())
                .ok_or(BootConfigError::MissingRemoteConfigUrl)?;
            Ok(vec![remote_config_kernel_param(os_family, url)?])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_param_table_matches_spec() {
        assert_eq!(
            remote_config_kernel_param(OsFamily::Kairos, "http://x/m.yaml").unwrap(),
            "config_url=http://x/m.yaml"
        );
        assert_eq!(
            remote_config_kernel_param(OsFamily::Talos, "http://x/m.yaml").unwrap(),
            "talos.config=http://x/m.yaml"
        );
        assert_eq!(
            remote_config_kernel_param(OsFamily::Flatcar, "http://x/m.yaml").unwrap(),
            "flatcar.ignition.config.url=http://x/m.yaml"
        );
        assert_eq!(
            remote_config_kernel_param(OsFamily::LeapMicro, "http://x/m.yaml").unwrap(),
            "combustion.path=http://x/m.yaml"
        );
    }

    #[test]
    fn pre_baked_iso_has_no_kernel_params() {
        assert_eq!(
            compute_kernel_params(ProvisioningMode::PreBakedISO, OsFamily::Talos, None).unwrap(),
            Vec::<String>::new()
        );
    }

    #[test]
    fn remote_config_requires_url() {
        assert_eq!(
            compute_kernel_params(ProvisioningMode::RemoteConfig, OsFamily::Talos, None),
            Err(BootConfigError::MissingRemoteConfigUrl)
        );
        assert_eq!(
            compute_kernel_params(ProvisioningMode::RemoteConfig, OsFamily::Talos, Some("")),
            Err(BootConfigError::MissingRemoteConfigUrl)
        );
    }

    #[test]
    fn remote_config_computes_single_param() {
        let params = compute_kernel_params(
            ProvisioningMode::RemoteConfig,
            OsFamily::Talos,
            Some("http://x/talos.yaml"),
        )
        .unwrap();
        assert_eq!(params, vec!["talos.config=http://x/talos.yaml".to_string()]);
    }
}
