//! Application configuration options

use std::time::Duration;

use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::workers::poller;
use crate::{agent, fanout, gateway, registry};

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage layout paths
    pub layout: StorageLayout,

    /// External command channel
    pub gateway: gateway::Options,

    /// Device registry
    pub registry: registry::Options,

    /// In-device agent channel
    pub agent: agent::Options,

    /// Group action stagger, shared by macro playback
    pub fanout: fanout::Options,

    /// Poller worker options
    pub poller: poller::Options,

    /// Enable local HTTP server
    pub enable_server: bool,

    /// Server configuration
    pub server: ServerOptions,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            layout: StorageLayout::default(),
            gateway: gateway::Options::default(),
            registry: registry::Options::default(),
            agent: agent::Options::default(),
            fanout: fanout::Options::default(),
            poller: poller::Options::default(),
            enable_server: true,
            server: ServerOptions::default(),
        }
    }
}

impl AppOptions {
    pub fn from_settings(settings: &Settings, layout: StorageLayout) -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            layout,
            gateway: gateway::Options {
                tool: settings.tool.clone(),
                max_concurrent: settings.max_concurrent_commands,
                default_timeout: Duration::from_millis(settings.command_timeout_ms),
                slow_threshold: Duration::from_millis(settings.slow_command_ms),
            },
            registry: registry::Options {
                agent_check_cooldown: Duration::from_millis(settings.agent_check_cooldown_ms),
            },
            agent: agent::Options {
                remote_port: settings.agent_port,
                timeout: Duration::from_millis(settings.agent_timeout_ms),
                retry_backoff: Duration::from_millis(settings.agent_retry_backoff_ms),
            },
            fanout: fanout::Options {
                stagger_base: Duration::from_millis(settings.stagger_base_ms),
                stagger_jitter: Duration::from_millis(settings.stagger_jitter_ms),
            },
            poller: poller::Options {
                interval: Duration::from_millis(settings.poll_interval_ms),
            },
            enable_server: settings.enable_server,
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
        }
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7300,
        }
    }
}
