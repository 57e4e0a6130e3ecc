//! Request/response client for the in-device agent.
//!
//! Each device is reached through one forwarded local port. The binding is
//! created on first use and replaced wholesale whenever an exchange fails at
//! the transport level; the failed exchange is then retried exactly once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, warn, Instrument, Span};

use crate::agent::protocol::{parse_flag, parse_reply, AgentRequest, Reply};
use crate::agent::AgentLink;
use crate::bridge::DeviceBridge;
use crate::errors::AgentError;

/// Agent channel options
#[derive(Debug, Clone)]
pub struct Options {
    /// Port the agent listens on inside the device
    pub remote_port: u16,

    /// Per-exchange timeout used by the convenience operations
    pub timeout: Duration,

    /// Pause between a failed exchange and its single retry
    pub retry_backoff: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            remote_port: 9008,
            timeout: Duration::from_secs(3),
            retry_backoff: Duration::from_millis(300),
        }
    }
}

/// Local end of a device's agent port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardBinding {
    pub local_port: u16,
    /// Unix milliseconds of the last successful exchange
    pub last_ok_ms: Option<i64>,
}

pub struct AgentChannel {
    bridge: Arc<dyn DeviceBridge>,
    options: Options,
    bindings: Mutex<HashMap<String, ForwardBinding>>,
    span: Span,
}

impl AgentChannel {
    pub fn new(bridge: Arc<dyn DeviceBridge>, options: Options, span: Span) -> Self {
        Self {
            bridge,
            options,
            bindings: Mutex::new(HashMap::new()),
            span,
        }
    }

    /// Current binding of a device, if one has been allocated
    pub fn binding(&self, device_id: &str) -> Option<ForwardBinding> {
        self.bindings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(device_id)
            .copied()
    }

    /// Forget a device's binding; the next exchange re-forwards.
    pub fn forget(&self, device_id: &str) {
        self.bindings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(device_id);
    }

    /// Send one request and return the reply line.
    ///
    /// `ERR...` replies fail with [`AgentError::Rejected`]. Transport failures
    /// cause one re-forward and one retry before the error is surfaced.
    pub async fn send(
        &self,
        device_id: &str,
        request: &AgentRequest,
        timeout: Duration,
    ) -> Result<String, AgentError> {
        let line = serde_json::to_string(request).map_err(|e| AgentError::Protocol(e.to_string()))?;
        let span = self.span.clone();

        async move {
            match self.attempt(device_id, &line, timeout).await {
                Err(e) if e.is_transport() => {
                    debug!(device = device_id, "Agent exchange failed ({}), re-forwarding", e);
                    self.forget(device_id);
                    tokio::time::sleep(self.options.retry_backoff).await;
                    self.attempt(device_id, &line, timeout).await.inspect_err(|e| {
                        warn!(device = device_id, "Agent exchange failed after retry: {}", e);
                    })
                }
                other => other,
            }
        }
        .instrument(span)
        .await
    }

    async fn attempt(&self, device_id: &str, line: &str, timeout: Duration) -> Result<String, AgentError> {
        let local_port = self.ensure_binding(device_id).await?;
        let reply = exchange(local_port, line, timeout).await?;
        self.mark_ok(device_id, local_port);
        parse_reply(&reply)?;
        Ok(reply)
    }

    async fn ensure_binding(&self, device_id: &str) -> Result<u16, AgentError> {
        if let Some(binding) = self.binding(device_id) {
            return Ok(binding.local_port);
        }

        let local_port = self.bridge.forward(device_id, self.options.remote_port).await?;
        debug!(device = device_id, local_port, "Forwarded agent port");
        self.bindings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                device_id.to_string(),
                ForwardBinding {
                    local_port,
                    last_ok_ms: None,
                },
            );
        Ok(local_port)
    }

    /// Replace the binding with a fresh one carrying the new success time,
    /// unless it was replaced in the meantime.
    fn mark_ok(&self, device_id: &str, local_port: u16) {
        let mut bindings = self.bindings.lock().unwrap_or_else(|e| e.into_inner());
        if bindings.get(device_id).map(|b| b.local_port) == Some(local_port) {
            bindings.insert(
                device_id.to_string(),
                ForwardBinding {
                    local_port,
                    last_ok_ms: Some(Utc::now().timestamp_millis()),
                },
            );
        }
    }

    async fn request(&self, device_id: &str, request: AgentRequest) -> Result<Reply, AgentError> {
        let line = self.send(device_id, &request, self.options.timeout).await?;
        parse_reply(&line)
    }

    pub async fn ping(&self, device_id: &str) -> Result<(), AgentError> {
        self.request(device_id, AgentRequest::Ping).await.map(|_| ())
    }

    pub async fn tap(&self, device_id: &str, x: u32, y: u32) -> Result<(), AgentError> {
        self.request(device_id, AgentRequest::Tap { x, y }).await.map(|_| ())
    }

    pub async fn swipe(
        &self,
        device_id: &str,
        from: (u32, u32),
        to: (u32, u32),
        duration_ms: u64,
    ) -> Result<(), AgentError> {
        let request = AgentRequest::Swipe {
            x1: from.0,
            y1: from.1,
            x2: to.0,
            y2: to.1,
            duration_ms,
        };
        self.request(device_id, request).await.map(|_| ())
    }

    pub async fn key(&self, device_id: &str, key: &str) -> Result<(), AgentError> {
        let request = AgentRequest::Key {
            key: key.to_ascii_uppercase(),
        };
        self.request(device_id, request).await.map(|_| ())
    }

    pub async fn text(&self, device_id: &str, text: &str) -> Result<(), AgentError> {
        let request = AgentRequest::Text {
            text: text.to_string(),
        };
        self.request(device_id, request).await.map(|_| ())
    }

    /// Clipboard contents, base64-decoded
    pub async fn clipboard(&self, device_id: &str) -> Result<String, AgentError> {
        let reply = self.request(device_id, AgentRequest::GetClipboard).await?;
        let bytes = BASE64
            .decode(reply.payload().trim())
            .map_err(|e| AgentError::Protocol(format!("clipboard is not base64: {e}")))?;
        String::from_utf8(bytes).map_err(|e| AgentError::Protocol(e.to_string()))
    }

    /// Whether the given text is currently on screen
    pub async fn find_text(&self, device_id: &str, text: &str) -> Result<bool, AgentError> {
        let request = AgentRequest::FindText {
            text: text.to_string(),
        };
        let reply = self.request(device_id, request).await?;
        parse_flag(reply.payload())
    }
}

#[async_trait]
impl AgentLink for AgentChannel {
    async fn ping(&self, device_id: &str) -> Result<(), AgentError> {
        AgentChannel::ping(self, device_id).await
    }

    async fn input_text(&self, device_id: &str, text: &str) -> Result<(), AgentError> {
        self.text(device_id, text).await
    }
}

/// One connect/write/read-line round trip against a forwarded port.
async fn exchange(local_port: u16, line: &str, timeout: Duration) -> Result<String, AgentError> {
    let round_trip = async {
        let mut stream = TcpStream::connect(("127.0.0.1", local_port)).await?;
        stream.write_all(line.as_bytes()).await?;
        stream.write_all(b"\n").await?;
        stream.flush().await?;

        let mut reader = BufReader::new(stream);
        let mut reply = String::new();
        if reader.read_line(&mut reply).await? == 0 {
            return Err(AgentError::Socket(std::io::ErrorKind::UnexpectedEof.into()));
        }
        Ok(reply.trim_end_matches(['\r', '\n']).to_string())
    };

    tokio::time::timeout(timeout, round_trip)
        .await
        .map_err(|_| AgentError::Timeout(timeout))?
}
