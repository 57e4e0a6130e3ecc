//! Application state management

use std::sync::Arc;

use tracing::{info, info_span};

use crate::agent::{AgentChannel, AgentLink};
use crate::app::options::AppOptions;
use crate::bridge::{AdbBridge, DeviceBridge};
use crate::fanout::FanoutEngine;
use crate::gateway::CommandGateway;
use crate::library::{GroupSource, JsonLibrary, MacroSource};
use crate::macros::MacroEngine;
use crate::registry::DeviceRegistry;

/// Every long-lived component, each built with its own logging span
pub struct AppState {
    pub registry: Arc<DeviceRegistry>,
    pub fanout: Arc<FanoutEngine>,
    pub macros: Arc<MacroEngine>,
}

impl AppState {
    /// Build the production component graph on top of the external tool.
    pub fn init(options: &AppOptions) -> Self {
        info!("Initializing application state...");

        let gateway = Arc::new(CommandGateway::new(
            options.gateway.clone(),
            info_span!("gateway", tool = %options.gateway.tool),
        ));
        let bridge: Arc<dyn DeviceBridge> = Arc::new(AdbBridge::new(gateway));

        let library = Arc::new(JsonLibrary::new(
            options.layout.groups_dir(),
            options.layout.macros_dir(),
        ));

        Self::with_components(options, bridge, library.clone(), library)
    }

    /// Build everything above the bridge from the given collaborators.
    pub fn with_components(
        options: &AppOptions,
        bridge: Arc<dyn DeviceBridge>,
        groups: Arc<dyn GroupSource>,
        macro_source: Arc<dyn MacroSource>,
    ) -> Self {
        let agent: Arc<dyn AgentLink> = Arc::new(AgentChannel::new(
            bridge.clone(),
            options.agent.clone(),
            info_span!("agent", port = options.agent.remote_port),
        ));

        let registry = Arc::new(DeviceRegistry::new(
            bridge.clone(),
            agent.clone(),
            options.registry.clone(),
            info_span!("registry"),
        ));

        let fanout = Arc::new(FanoutEngine::new(
            registry.clone(),
            groups.clone(),
            bridge.clone(),
            options.fanout.clone(),
            info_span!("fanout"),
        ));

        let macros = Arc::new(MacroEngine::new(
            registry.clone(),
            groups,
            macro_source,
            bridge,
            agent,
            options.fanout.clone(),
            info_span!("macros"),
        ));

        Self {
            registry,
            fanout,
            macros,
        }
    }

    /// Stop macro runs and release every device queue
    pub fn shutdown(&self) {
        info!("Shutting down application state...");
        let stopped = self.macros.stop_all();
        if stopped > 0 {
            info!("Stopped {} macro run(s)", stopped);
        }
        self.registry.dispose();
    }
}
