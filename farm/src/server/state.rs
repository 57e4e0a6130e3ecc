//! Server state

use std::sync::Arc;

use crate::app::state::AppState;
use crate::fanout::FanoutEngine;
use crate::macros::MacroEngine;
use crate::registry::DeviceRegistry;

/// Server state shared across handlers
pub struct ServerState {
    pub registry: Arc<DeviceRegistry>,
    pub fanout: Arc<FanoutEngine>,
    pub macros: Arc<MacroEngine>,
}

impl ServerState {
    pub fn new(registry: Arc<DeviceRegistry>, fanout: Arc<FanoutEngine>, macros: Arc<MacroEngine>) -> Self {
        Self {
            registry,
            fanout,
            macros,
        }
    }

    pub fn from_app(app_state: &AppState) -> Self {
        Self::new(
            app_state.registry.clone(),
            app_state.fanout.clone(),
            app_state.macros.clone(),
        )
    }
}
