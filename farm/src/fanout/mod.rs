//! Multi-device fanout

pub mod engine;

use std::sync::Arc;
use std::time::Duration;

use crate::device::Device;
use crate::library::Group;
use crate::registry::DeviceRegistry;

pub use engine::{Action, Direction, FanoutEngine, FanoutReport};

/// Stagger applied between the devices of one group-wide operation
#[derive(Debug, Clone)]
pub struct Options {
    /// The i-th device waits `stagger_base * i` ...
    pub stagger_base: Duration,

    /// ... plus a uniform random extra of up to `stagger_jitter`
    pub stagger_jitter: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            stagger_base: Duration::from_millis(120),
            stagger_jitter: Duration::from_millis(250),
        }
    }
}

/// Known ONLINE devices of a group, in group order, without duplicates.
pub fn online_members(registry: &DeviceRegistry, group: &Group) -> Vec<Arc<Device>> {
    let mut seen = std::collections::HashSet::new();
    group
        .devices
        .iter()
        .filter(|id| seen.insert(id.as_str()))
        .filter_map(|id| registry.get(id))
        .filter(|device| device.info().is_online())
        .collect()
}
