//! `PhysicalHost` reconciler: drives bare-metal servers through enrollment,
//! inspection, and provisioning over Redfish.

pub mod controller;
pub mod deprovision;
pub mod error;
pub mod reconciler;

pub use controller::{run, ControllerConfig};
pub use error::ControllerError;
