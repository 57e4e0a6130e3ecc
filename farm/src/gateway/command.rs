//! Concurrency-limited execution of external device commands.
//!
//! Every device queue funnels its external commands through one
//! [`CommandGateway`]. The gateway admits at most `max_concurrent` processes at
//! a time; further callers wait on a fair semaphore and are released in
//! arrival order as slots free up.

use std::ffi::OsStr;
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn, Instrument, Span};

use crate::errors::CommandError;

/// Stderr is cut to this many characters in log events.
const STDERR_LOG_LIMIT: usize = 300;

/// Command gateway options
#[derive(Debug, Clone)]
pub struct Options {
    /// Executable of the external command channel
    pub tool: String,

    /// Maximum simultaneously running external commands
    pub max_concurrent: usize,

    /// Timeout used by callers that do not pass their own
    pub default_timeout: Duration,

    /// Calls slower than this are logged
    pub slow_threshold: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            tool: "adb".to_string(),
            max_concurrent: 3,
            default_timeout: Duration::from_secs(15),
            slow_threshold: Duration::from_secs(2),
        }
    }
}

/// Global, FIFO-fair admission queue in front of the external command tool
pub struct CommandGateway {
    options: Options,
    permits: Semaphore,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    span: Span,
}

/// Decrements the in-flight counter however the call ends.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl CommandGateway {
    pub fn new(options: Options, span: Span) -> Self {
        let max_concurrent = options.max_concurrent.max(1);
        Self {
            permits: Semaphore::new(max_concurrent),
            options,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            span,
        }
    }

    /// Number of external processes currently running
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously running processes observed so far
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Run `<tool> <args...>` once a slot is free and return its stdout.
    pub async fn execute<I, S>(&self, args: I, timeout: Duration) -> Result<String, CommandError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.as_ref().to_string_lossy().into_owned())
            .collect();

        self.execute_impl(args, timeout)
            .instrument(self.span.clone())
            .await
    }

    /// Like [`CommandGateway::execute`] with the configured default timeout.
    pub async fn execute_default<I, S>(&self, args: I) -> Result<String, CommandError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.execute(args, self.options.default_timeout).await
    }

    async fn execute_impl(&self, args: Vec<String>, timeout: Duration) -> Result<String, CommandError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| CommandError::Spawn(std::io::Error::other(e)))?;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let cmdline = args.join(" ");
        debug!(in_flight = now, "exec {} {}", self.options.tool, cmdline);

        let started = Instant::now();
        let child = Command::new(&self.options.tool)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                warn!("Failed to spawn {} {}: {}", self.options.tool, cmdline, e);
                CommandError::Spawn(e)
            })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!("Failed to collect output of {}: {}", cmdline, e);
                return Err(CommandError::Spawn(e));
            }
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Command timed out: {}", cmdline);
                return Err(CommandError::Timeout { after: timeout });
            }
        };

        let elapsed = started.elapsed();
        if elapsed > self.options.slow_threshold {
            info!(elapsed_ms = elapsed.as_millis() as u64, "Slow command: {}", cmdline);
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(
                code = ?output.status.code(),
                "Command failed: {}: {}",
                cmdline,
                truncate(&stderr, STDERR_LOG_LIMIT)
            );
            return Err(CommandError::Exit {
                code: output.status.code(),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
