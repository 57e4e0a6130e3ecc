//! External command channel backed by the `adb` tool

use std::sync::Arc;

use async_trait::async_trait;

use crate::bridge::{DeviceBridge, DiscoveredDevice};
use crate::device::DeviceState;
use crate::errors::CommandError;
use crate::gateway::CommandGateway;

/// [`DeviceBridge`] that shells out through the command gateway
pub struct AdbBridge {
    gateway: Arc<CommandGateway>,
}

impl AdbBridge {
    pub fn new(gateway: Arc<CommandGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl DeviceBridge for AdbBridge {
    async fn list_devices(&self) -> Result<Vec<DiscoveredDevice>, CommandError> {
        let out = self.gateway.execute_default(["devices", "-l"]).await?;
        Ok(parse_devices(&out))
    }

    async fn forward(&self, device_id: &str, remote_port: u16) -> Result<u16, CommandError> {
        let remote = format!("tcp:{remote_port}");
        let out = self
            .gateway
            .execute_default(["-s", device_id, "forward", "tcp:0", remote.as_str()])
            .await?;
        out.trim()
            .parse()
            .map_err(|_| CommandError::Output(format!("forward returned {:?}", out.trim())))
    }

    async fn shell(&self, device_id: &str, command: &str) -> Result<String, CommandError> {
        self.gateway
            .execute_default(["-s", device_id, "shell", command])
            .await
    }
}

/// Parse the long-form device listing.
///
/// ```text
/// List of devices attached
/// R58M123ABC     device usb:1-1 product:a51 model:SM_A515F device:a51 transport_id:3
/// emulator-5554  offline transport_id:1
/// ```
pub fn parse_devices(out: &str) -> Vec<DiscoveredDevice> {
    out.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let id = fields.next()?.to_string();
            let state = match fields.next()? {
                "device" => DeviceState::Online,
                "offline" => DeviceState::Offline,
                "unauthorized" => DeviceState::Unauthorized,
                _ => DeviceState::Unknown,
            };
            let model = fields
                .find_map(|f| f.strip_prefix("model:"))
                .map(str::to_string);
            Some(DiscoveredDevice { id, state, model })
        })
        .collect()
}
