//! Line protocol spoken by the in-device agent.
//!
//! A request is one JSON object followed by `\n`; the reply is the first
//! newline-terminated line read back.

use serde::Serialize;

use crate::errors::AgentError;

/// Requests understood by the agent
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "cmd", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum AgentRequest {
    Ping,
    Tap { x: u32, y: u32 },
    Swipe { x1: u32, y1: u32, x2: u32, y2: u32, duration_ms: u64 },
    Key { key: String },
    Text { text: String },
    GetClipboard,
    FindText { text: String },
}

/// A reply line that was not an `ERR`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `OK`, with whatever followed the prefix
    Ok(String),
    /// Anything else, verbatim
    Other(String),
}

impl Reply {
    /// Payload of an `OK` reply, or the whole line otherwise
    pub fn payload(&self) -> &str {
        match self {
            Reply::Ok(payload) => payload,
            Reply::Other(line) => line,
        }
    }
}

/// Classify one reply line (without its terminator).
pub fn parse_reply(line: &str) -> Result<Reply, AgentError> {
    if line.starts_with("ERR") {
        return Err(AgentError::Rejected(line.to_string()));
    }
    match line.strip_prefix("OK") {
        Some(rest) => Ok(Reply::Ok(rest.trim_start_matches([':', ' ']).to_string())),
        None => Ok(Reply::Other(line.to_string())),
    }
}

/// Interpret a text-search payload: `1` means found.
pub fn parse_flag(payload: &str) -> Result<bool, AgentError> {
    match payload.trim() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        other => Err(AgentError::Protocol(format!("expected 1 or 0, got {other:?}"))),
    }
}
