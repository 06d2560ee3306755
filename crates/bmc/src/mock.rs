//! `MockBmcClient` for unit testing.
//!
//! Stores state in memory and can be preconfigured to return specific
//! responses, so reconciler tests run without a running Redfish endpoint.

use crate::bmc_trait::BmcClient;
use crate::error::BmcError;
use crate::models::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// In-memory BMC test double.
#[derive(Clone)]
pub struct MockBmcClient {
    base_url: String,
    system_info: Arc<Mutex<SystemInfo>>,
    boot_source: Arc<Mutex<Option<BootSource>>>,
    virtual_media_inserted: Arc<Mutex<Option<String>>>,
    bios_attributes: Arc<Mutex<HashMap<String, String>>>,
    ethernet_interfaces: Arc<Mutex<Vec<EthernetInterface>>>,
    boot_options: Arc<Mutex<Vec<BootOption>>>,
    closed: Arc<Mutex<bool>>,
    fail_next_power_set: Arc<Mutex<bool>>,
    power_set_calls: Arc<Mutex<Vec<PowerAction>>>,
}

impl MockBmcClient {
    /// Create a mock with the given reported system info and no other state.
    #[must_use]
    pub fn new(base_url: impl Into<String>, system_info: SystemInfo) -> Self {
        Self {
            base_url: base_url.into(),
            system_info: Arc::new(Mutex::new(system_info)),
            boot_source: Arc::new(Mutex::new(None)),
            virtual_media_inserted: Arc::new(Mutex::new(None)),
            bios_attributes: Arc::new(Mutex::new(HashMap::new())),
            ethernet_interfaces: Arc::new(Mutex::new(Vec::new())),
            boot_options: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(Mutex::new(false)),
            fail_next_power_set: Arc::new(Mutex::new(false)),
            power_set_calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Seed a BIOS attribute as if previously read from firmware.
    pub fn with_bios_attribute(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.bios_attributes
            .lock()
            .expect("mock mutex poisoned")
            .insert(name.into(), value.into());
        self
    }

    /// Seed discovered ethernet interfaces.
    pub fn with_ethernet_interfaces(self, interfaces: Vec<EthernetInterface>) -> Self {
        *self.ethernet_interfaces.lock().expect("mock mutex poisoned") = interfaces;
        self
    }

    /// Make the next `set_power_state` call return a connection error, to
    /// exercise the transient-failure retry path.
    pub fn fail_next_power_set(&self) {
        *self.fail_next_power_set.lock().expect("mock mutex poisoned") = true;
    }

    /// Last boot source set via `set_boot_source`, for assertions.
    #[must_use]
    pub fn last_boot_source(&self) -> Option<BootSource> {
        self.boot_source.lock().expect("mock mutex poisoned").clone()
    }

    /// Whether `insert_virtual_media` was called, and with what URL.
    #[must_use]
    pub fn inserted_media(&self) -> Option<String> {
        self.virtual_media_inserted
            .lock()
            .expect("mock mutex poisoned")
            .clone()
    }

    /// Whether `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.closed.lock().expect("mock mutex poisoned")
    }

    /// Every `set_power_state` action issued so far, in call order.
    #[must_use]
    pub fn power_set_calls(&self) -> Vec<PowerAction> {
        self.power_set_calls.lock().expect("mock mutex poisoned").clone()
    }
}

#[async_trait::async_trait]
impl BmcClient for MockBmcClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_system_info(&self) -> Result<SystemInfo, BmcError> {
        Ok(self.system_info.lock().expect("mock mutex poisoned").clone())
    }

    async fn get_power_state(&self) -> Result<PowerState, BmcError> {
        Ok(self.system_info.lock().expect("mock mutex poisoned").power_state)
    }

    async fn set_power_state(&self, action: PowerAction) -> Result<(), BmcError> {
        let mut should_fail = self.fail_next_power_set.lock().expect("mock mutex poisoned");
        if *should_fail {
            *should_fail = false;
            return Err(BmcError::Timeout("mock power action timed out".to_string()));
        }
        drop(should_fail);

        self.power_set_calls.lock().expect("mock mutex poisoned").push(action);

        let mut info = self.system_info.lock().expect("mock mutex poisoned");
        info.power_state = match action {
            PowerAction::On | PowerAction::ForceRestart => PowerState::On,
            PowerAction::ForceOff => PowerState::Off,
        };
        Ok(())
    }

    async fn set_boot_source(&self, source: BootSource) -> Result<(), BmcError> {
        *self.boot_source.lock().expect("mock mutex poisoned") = Some(source);
        Ok(())
    }

    async fn list_boot_options(&self) -> Result<Vec<BootOption>, BmcError> {
        Ok(self.boot_options.lock().expect("mock mutex poisoned").clone())
    }

    async fn insert_virtual_media(&self, image_url: &str) -> Result<(), BmcError> {
        *self.virtual_media_inserted.lock().expect("mock mutex poisoned") =
            Some(image_url.to_string());
        Ok(())
    }

    async fn eject_virtual_media(&self) -> Result<(), BmcError> {
        *self.virtual_media_inserted.lock().expect("mock mutex poisoned") = None;
        Ok(())
    }

    async fn get_bios_attribute(&self, name: &str) -> Result<Option<String>, BmcError> {
        Ok(self
            .bios_attributes
            .lock()
            .expect("mock mutex poisoned")
            .get(name)
            .cloned())
    }

    async fn set_bios_attribute(
        &self,
        name: &str,
        value: &str,
        _apply_time: ApplyTime,
    ) -> Result<(), BmcError> {
        self.bios_attributes
            .lock()
            .expect("mock mutex poisoned")
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn list_ethernet_interfaces(&self) -> Result<Vec<EthernetInterface>, BmcError> {
        Ok(self
            .ethernet_interfaces
            .lock()
            .expect("mock mutex poisoned")
            .clone())
    }

    async fn close(&self) -> Result<(), BmcError> {
        *self.closed.lock().expect("mock mutex poisoned") = true;
        Ok(())
    }
}
