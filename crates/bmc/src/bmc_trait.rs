//! `BmcClient` trait for mocking.
//!
//! This trait abstracts the Redfish BMC client to enable mocking in unit
//! tests. The concrete `RedfishBmcClient` implements this trait, and tests
//! use `MockBmcClient` instead of a running BMC.

use crate::error::BmcError;
use crate::models::*;

/// Capability set a reconciler needs from a BMC ("Interface over
/// BMC").
///
/// All methods are async and must be `Send` to work with Tokio's
/// work-stealing runtime. `close` must be called exactly once per reconcile,
/// on every exit path, before the client is dropped.
#[async_trait::async_trait]
pub trait BmcClient: Send + Sync {
    /// Base URL this client was constructed against.
    fn base_url(&self) -> &str;

    /// Fetch manufacturer/model/serial/health/power state.
    async fn get_system_info(&self) -> Result<SystemInfo, BmcError>;

    /// Read current power state.
    async fn get_power_state(&self) -> Result<PowerState, BmcError>;

    /// Issue a power action.
    async fn set_power_state(&self, action: PowerAction) -> Result<(), BmcError>;

    /// Set a one-shot boot source override.
    async fn set_boot_source(&self, source: BootSource) -> Result<(), BmcError>;

    /// List named boot options (declared for the Boot Options
    /// mechanism, which remains unimplemented — see `apply_boot_options`).
    async fn list_boot_options(&self) -> Result<Vec<BootOption>, BmcError>;

    /// Insert virtual media at the given image URL.
    async fn insert_virtual_media(&self, image_url: &str) -> Result<(), BmcError>;

    /// Eject any currently inserted virtual media.
    async fn eject_virtual_media(&self) -> Result<(), BmcError>;

    /// Read a BIOS attribute by name.
    async fn get_bios_attribute(&self, name: &str) -> Result<Option<String>, BmcError>;

    /// Write a BIOS attribute, applying at the given time.
    async fn set_bios_attribute(
        &self,
        name: &str,
        value: &str,
        apply_time: ApplyTime,
    ) -> Result<(), BmcError>;

    /// List ethernet interfaces, falling back from `EthernetInterfaces` to
    /// `NetworkInterfaces/.../NetworkDeviceFunctions` when the former is empty
    /// ("network interfaces with port/device-function fallback").
    async fn list_ethernet_interfaces(&self) -> Result<Vec<EthernetInterface>, BmcError>;

    /// Close the session. Must be safe to call more than once.
    async fn close(&self) -> Result<(), BmcError>;
}
