//! Façade over the external command channel.
//!
//! The core never builds command lines itself; it talks to a [`DeviceBridge`].
//! [`adb::AdbBridge`] is the production implementation, tests provide fakes.

pub mod adb;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::device::{DeviceState, Resolution};
use crate::errors::CommandError;

pub use adb::AdbBridge;

/// One line of discovery output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub id: String,
    pub state: DeviceState,
    pub model: Option<String>,
}

/// Operations the core needs from the external command channel
#[async_trait]
pub trait DeviceBridge: Send + Sync {
    /// List currently attached devices
    async fn list_devices(&self) -> Result<Vec<DiscoveredDevice>, CommandError>;

    /// Forward an arbitrary free local port to `remote_port` on the device and
    /// return the local port
    async fn forward(&self, device_id: &str, remote_port: u16) -> Result<u16, CommandError>;

    /// Run a shell command on the device and return its stdout
    async fn shell(&self, device_id: &str, command: &str) -> Result<String, CommandError>;

    /// Read a system property. Empty values are reported as `None`.
    async fn get_prop(&self, device_id: &str, key: &str) -> Result<Option<String>, CommandError> {
        let out = self.shell(device_id, &format!("getprop {key}")).await?;
        let value = out.trim();
        Ok((!value.is_empty()).then(|| value.to_string()))
    }

    async fn screen_size(&self, device_id: &str) -> Result<Option<Resolution>, CommandError> {
        let out = self.shell(device_id, "wm size").await?;
        Ok(parse_screen_size(&out))
    }

    async fn tap(&self, device_id: &str, x: u32, y: u32) -> Result<(), CommandError> {
        self.shell(device_id, &format!("input tap {x} {y}")).await?;
        Ok(())
    }

    async fn swipe(
        &self,
        device_id: &str,
        from: (u32, u32),
        to: (u32, u32),
        duration_ms: u64,
    ) -> Result<(), CommandError> {
        let cmd = format!(
            "input swipe {} {} {} {} {}",
            from.0, from.1, to.0, to.1, duration_ms
        );
        self.shell(device_id, &cmd).await?;
        Ok(())
    }

    /// A zero-distance swipe held for `duration_ms`
    async fn long_press(&self, device_id: &str, x: u32, y: u32, duration_ms: u64) -> Result<(), CommandError> {
        self.swipe(device_id, (x, y), (x, y), duration_ms).await
    }

    async fn key(&self, device_id: &str, key: &str) -> Result<(), CommandError> {
        self.shell(device_id, &format!("input keyevent {}", keycode(key))).await?;
        Ok(())
    }

    async fn wake(&self, device_id: &str) -> Result<(), CommandError> {
        self.key(device_id, "WAKEUP").await
    }

    async fn screen_off(&self, device_id: &str) -> Result<(), CommandError> {
        self.key(device_id, "SLEEP").await
    }

    async fn shutdown(&self, device_id: &str) -> Result<(), CommandError> {
        self.shell(device_id, "reboot -p").await?;
        Ok(())
    }
}

/// Normalise a key name to an input keycode argument.
///
/// `home` becomes `KEYCODE_HOME`; numeric codes and names that already carry
/// the prefix pass through.
pub fn keycode(key: &str) -> String {
    let key = key.trim().to_ascii_uppercase();
    if key.starts_with("KEYCODE_") || key.chars().all(|c| c.is_ascii_digit()) {
        key
    } else {
        format!("KEYCODE_{key}")
    }
}

/// Parse `wm size` output. An `Override size` line wins over `Physical size`.
pub fn parse_screen_size(out: &str) -> Option<Resolution> {
    let mut physical = None;
    let mut override_size = None;

    for line in out.lines() {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let Some((w, h)) = value.trim().split_once('x') else {
            continue;
        };
        let (Ok(width), Ok(height)) = (w.trim().parse(), h.trim().parse()) else {
            continue;
        };
        let size = Resolution::new(width, height);
        match label.trim() {
            "Override size" => override_size = Some(size),
            "Physical size" => physical = Some(size),
            _ => {}
        }
    }

    override_size.or(physical)
}
