//! Settings file management

use serde::{Deserialize, Serialize};

use crate::errors::FarmError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Controller settings. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,

    /// Also write daily rotated log files under the logs directory
    #[serde(default)]
    pub log_to_file: bool,

    /// External command channel executable
    #[serde(default = "default_tool")]
    pub tool: String,

    /// Most external commands allowed in flight at once
    #[serde(default = "default_max_concurrent_commands")]
    pub max_concurrent_commands: usize,

    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Calls slower than this are logged
    #[serde(default = "default_slow_command_ms")]
    pub slow_command_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_agent_check_cooldown_ms")]
    pub agent_check_cooldown_ms: u64,

    /// Device-side port the agent listens on
    #[serde(default = "default_agent_port")]
    pub agent_port: u16,

    #[serde(default = "default_agent_timeout_ms")]
    pub agent_timeout_ms: u64,

    #[serde(default = "default_agent_retry_backoff_ms")]
    pub agent_retry_backoff_ms: u64,

    #[serde(default = "default_stagger_base_ms")]
    pub stagger_base_ms: u64,

    #[serde(default = "default_stagger_jitter_ms")]
    pub stagger_jitter_ms: u64,

    /// Local control API
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default = "default_true")]
    pub enable_server: bool,
}

fn default_true() -> bool {
    true
}

fn default_tool() -> String {
    "adb".to_string()
}

fn default_max_concurrent_commands() -> usize {
    3
}

fn default_command_timeout_ms() -> u64 {
    15_000
}

fn default_slow_command_ms() -> u64 {
    2_000
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_agent_check_cooldown_ms() -> u64 {
    5_000
}

fn default_agent_port() -> u16 {
    9008
}

fn default_agent_timeout_ms() -> u64 {
    3_000
}

fn default_agent_retry_backoff_ms() -> u64 {
    300
}

fn default_stagger_base_ms() -> u64 {
    120
}

fn default_stagger_jitter_ms() -> u64 {
    250
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_to_file: false,
            tool: default_tool(),
            max_concurrent_commands: default_max_concurrent_commands(),
            command_timeout_ms: default_command_timeout_ms(),
            slow_command_ms: default_slow_command_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            agent_check_cooldown_ms: default_agent_check_cooldown_ms(),
            agent_port: default_agent_port(),
            agent_timeout_ms: default_agent_timeout_ms(),
            agent_retry_backoff_ms: default_agent_retry_backoff_ms(),
            stagger_base_ms: default_stagger_base_ms(),
            stagger_jitter_ms: default_stagger_jitter_ms(),
            server: ServerSettings::default(),
            enable_server: true,
        }
    }
}

impl Settings {
    /// Read the settings file. A missing file yields the defaults.
    pub async fn load(file: &File) -> Result<Self, FarmError> {
        Ok(file.read_json_opt::<Settings>().await?.unwrap_or_default())
    }
}

/// Local HTTP server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    7300
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}
