//! Error types for the farm controller

use std::time::Duration;

use thiserror::Error;

/// Failure of one invocation of the external command channel
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("command timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("command exited with code {code:?}: {stderr}")]
    Exit { code: Option<i32>, stderr: String },

    #[error("failed to spawn command: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("unexpected command output: {0}")]
    Output(String),
}

/// Failure talking to the in-device agent
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("agent did not answer within {0:?}")]
    Timeout(Duration),

    #[error("agent socket error: {0}")]
    Socket(#[from] std::io::Error),

    #[error("port forward failed: {0}")]
    Forward(#[from] CommandError),

    /// The agent answered with an `ERR...` line. Holds the line verbatim.
    #[error("{0}")]
    Rejected(String),

    #[error("malformed agent reply: {0}")]
    Protocol(String),
}

impl AgentError {
    /// Whether the failure happened below the request/response layer, in which
    /// case the binding is presumed stale and the exchange may be retried.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AgentError::Timeout(_) | AgentError::Socket(_) | AgentError::Forward(_)
        )
    }

    /// Whether the agent refused text input because nothing editable has focus.
    pub fn is_focus_lost(&self) -> bool {
        match self {
            AgentError::Rejected(line) => {
                let line = line.to_ascii_lowercase();
                line.contains("focus") || line.contains("editable")
            }
            _ => false,
        }
    }
}

/// Main error type for the farm controller
#[derive(Error, Debug)]
pub enum FarmError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("External command error: {0}")]
    Command(#[from] CommandError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Queue disposed: {0}")]
    Disposed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
