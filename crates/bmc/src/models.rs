//! Plain data types exchanged with a BMC, independent of wire format.

use serde::{Deserialize, Serialize};

/// System identity and health, as read from the Redfish `Systems` member.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SystemInfo {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub health: Option<String>,
    pub power_state: PowerState,
}

/// Power state as reported by the BMC.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PowerState {
    On,
    Off,
    #[default]
    Unknown,
}

/// A power action issued to the system.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PowerAction {
    On,
    ForceOff,
    ForceRestart,
}

/// A one-shot boot source override target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum BootSource {
    Pxe,
    CdDvd,
    UefiTarget(String),
    None,
}

/// One named boot option as reported by `BootOptions` collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BootOption {
    pub id: String,
    pub display_name: String,
}

/// When a BIOS attribute change takes effect.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ApplyTime {
    Immediate,
    OnReset,
}

/// One reported ethernet interface.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct EthernetInterface {
    pub id: String,
    pub mac_address: Option<String>,
    pub ipv4_addresses: Vec<String>,
    pub ipv6_addresses: Vec<String>,
}
