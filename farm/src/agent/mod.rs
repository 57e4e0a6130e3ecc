//! In-device agent access

pub mod channel;
pub mod protocol;

use async_trait::async_trait;

use crate::errors::AgentError;

pub use channel::{AgentChannel, ForwardBinding, Options};
pub use protocol::{AgentRequest, Reply};

/// The agent operations the registry and the macro player depend on
#[async_trait]
pub trait AgentLink: Send + Sync {
    /// Succeeds when the agent answers
    async fn ping(&self, device_id: &str) -> Result<(), AgentError>;

    /// Type text into the focused field
    async fn input_text(&self, device_id: &str, text: &str) -> Result<(), AgentError>;
}
