//! Device entities and their serialized work queues

pub mod model;
pub mod queue;

pub use model::{Device, DeviceInfo, DeviceState, Resolution};
pub use queue::{DeviceQueue, Ticket};
