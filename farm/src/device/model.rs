//! Device entity

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::Span;

use crate::device::queue::DeviceQueue;

/// Connectivity state as reported by discovery
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceState {
    #[default]
    Unknown,
    Online,
    Offline,
    Unauthorized,
}

/// Screen size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Observable attributes of a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub id: String,
    pub state: DeviceState,
    pub model: Option<String>,
    pub os_version: Option<String>,
    pub resolution: Option<Resolution>,
    pub agent_ready: bool,
    pub last_agent_check_at: Option<DateTime<Utc>>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl DeviceInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: DeviceState::Unknown,
            model: None,
            os_version: None,
            resolution: None,
            agent_ready: false,
            last_agent_check_at: None,
            last_seen_at: None,
        }
    }

    pub fn is_online(&self) -> bool {
        self.state == DeviceState::Online
    }

    /// Change the connectivity state. Leaving ONLINE clears agent readiness.
    pub fn set_state(&mut self, state: DeviceState) {
        self.state = state;
        if state != DeviceState::Online {
            self.agent_ready = false;
        }
    }

    /// Record an agent check result. Only an ONLINE device can be ready.
    pub fn set_agent_ready(&mut self, ready: bool) {
        self.agent_ready = ready && self.is_online();
    }

    /// Whether any of the enrichment attributes is still unknown
    pub fn needs_enrichment(&self) -> bool {
        self.model.is_none() || self.os_version.is_none() || self.resolution.is_none()
    }
}

/// A discovered device with its own serialized work queue
pub struct Device {
    id: String,
    info: RwLock<DeviceInfo>,
    queue: DeviceQueue,
}

impl Device {
    pub fn new(id: impl Into<String>, span: Span) -> Self {
        let id = id.into();
        Self {
            info: RwLock::new(DeviceInfo::new(id.clone())),
            queue: DeviceQueue::new(id.clone(), span),
            id,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Snapshot of the current attributes
    pub fn info(&self) -> DeviceInfo {
        self.info.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn state(&self) -> DeviceState {
        self.info.read().unwrap_or_else(|e| e.into_inner()).state
    }

    pub fn resolution(&self) -> Option<Resolution> {
        self.info.read().unwrap_or_else(|e| e.into_inner()).resolution
    }

    /// Mutate the attributes in place and return what the closure returns
    pub fn update<R>(&self, f: impl FnOnce(&mut DeviceInfo) -> R) -> R {
        let mut info = self.info.write().unwrap_or_else(|e| e.into_inner());
        f(&mut info)
    }

    pub fn queue(&self) -> &DeviceQueue {
        &self.queue
    }
}
