//! Device discovery and reconciliation

pub mod fleet;

pub use fleet::{DeviceRegistry, Options};
