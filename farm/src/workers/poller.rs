//! Polling worker driving device discovery

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, info};

use crate::registry::DeviceRegistry;

/// Poller worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Polling interval
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
        }
    }
}

/// Run the poller worker. The first cycle runs immediately.
pub async fn run<S, F>(
    options: &Options,
    registry: &DeviceRegistry,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Poller worker starting...");

    loop {
        // Skipped when an out-of-band refresh is still running
        if !registry.poll().await {
            debug!("Previous poll cycle still running");
        }

        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Poller worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }
    }
}
