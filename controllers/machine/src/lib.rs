//! `Beskar7Machine` reconciler: binds machines to `PhysicalHost`s, drives
//! boot configuration, and mirrors provisioning state.

pub mod boot_config;
pub mod controller;
pub mod error;
pub mod reconciler;

pub use controller::{run, ControllerConfig};
pub use error::ControllerError;
