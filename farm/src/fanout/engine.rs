//! Immediate group actions.
//!
//! Every action is turned into one task per ONLINE member, each submitted to
//! that device's own queue and delayed by its stagger. Per-device failures
//! are logged inside the task and never reach the caller.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn, Instrument, Span};

use crate::bridge::DeviceBridge;
use crate::device::{Device, Resolution};
use crate::errors::FarmError;
use crate::fanout::{online_members, Options};
use crate::jitter::{jittered_px, stagger_delay};
use crate::library::GroupSource;
use crate::registry::DeviceRegistry;

const SWIPE_NEAR: f64 = 0.25;
const SWIPE_FAR: f64 = 0.75;
const SWIPE_MS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Start and end of a centred swipe in this direction
    pub fn endpoints(self) -> ((f64, f64), (f64, f64)) {
        match self {
            Direction::Up => ((0.5, SWIPE_FAR), (0.5, SWIPE_NEAR)),
            Direction::Down => ((0.5, SWIPE_NEAR), (0.5, SWIPE_FAR)),
            Direction::Left => ((SWIPE_FAR, 0.5), (SWIPE_NEAR, 0.5)),
            Direction::Right => ((SWIPE_NEAR, 0.5), (SWIPE_FAR, 0.5)),
        }
    }
}

/// One group-wide action. Positions are screen fractions.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Tap {
        x: f64,
        y: f64,
        jitter_pct: f64,
    },
    Swipe {
        from: (f64, f64),
        to: (f64, f64),
        duration_ms: u64,
        jitter_pct: f64,
    },
    Key(String),
    Wake,
    ScreenOff,
    Shutdown,
}

impl Action {
    fn name(&self) -> &'static str {
        match self {
            Action::Tap { .. } => "tap",
            Action::Swipe { .. } => "swipe",
            Action::Key(_) => "key",
            Action::Wake => "wake",
            Action::ScreenOff => "screen-off",
            Action::Shutdown => "shutdown",
        }
    }

    fn needs_resolution(&self) -> bool {
        matches!(self, Action::Tap { .. } | Action::Swipe { .. })
    }
}

/// Devices an action was submitted to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FanoutReport {
    pub devices: Vec<String>,
}

pub struct FanoutEngine {
    registry: Arc<DeviceRegistry>,
    groups: Arc<dyn GroupSource>,
    bridge: Arc<dyn DeviceBridge>,
    options: Options,
    span: Span,
}

impl FanoutEngine {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        groups: Arc<dyn GroupSource>,
        bridge: Arc<dyn DeviceBridge>,
        options: Options,
        span: Span,
    ) -> Self {
        Self {
            registry,
            groups,
            bridge,
            options,
            span,
        }
    }

    pub async fn tap_at(&self, group_id: &str, x: f64, y: f64, jitter_pct: f64) -> Result<FanoutReport, FarmError> {
        self.dispatch(group_id, Action::Tap { x, y, jitter_pct }).await
    }

    pub async fn swipe_at(
        &self,
        group_id: &str,
        from: (f64, f64),
        to: (f64, f64),
        duration_ms: u64,
        jitter_pct: f64,
    ) -> Result<FanoutReport, FarmError> {
        let action = Action::Swipe {
            from,
            to,
            duration_ms,
            jitter_pct,
        };
        self.dispatch(group_id, action).await
    }

    pub async fn swipe_direction(
        &self,
        group_id: &str,
        direction: Direction,
        jitter_pct: f64,
    ) -> Result<FanoutReport, FarmError> {
        let (from, to) = direction.endpoints();
        self.swipe_at(group_id, from, to, SWIPE_MS, jitter_pct).await
    }

    pub async fn key(&self, group_id: &str, key: &str) -> Result<FanoutReport, FarmError> {
        self.dispatch(group_id, Action::Key(key.to_ascii_uppercase())).await
    }

    pub async fn wake(&self, group_id: &str) -> Result<FanoutReport, FarmError> {
        self.dispatch(group_id, Action::Wake).await
    }

    pub async fn screen_off(&self, group_id: &str) -> Result<FanoutReport, FarmError> {
        self.dispatch(group_id, Action::ScreenOff).await
    }

    pub async fn shutdown(&self, group_id: &str) -> Result<FanoutReport, FarmError> {
        self.dispatch(group_id, Action::Shutdown).await
    }

    /// Submit `action` to every eligible member of the group.
    ///
    /// Fails only when the group is unknown; the returned report lists the
    /// devices a task was submitted to.
    pub async fn dispatch(&self, group_id: &str, action: Action) -> Result<FanoutReport, FarmError> {
        let group = self.groups.group(group_id).await?;
        let mut report = FanoutReport::default();

        for device in online_members(&self.registry, &group) {
            if action.needs_resolution() && device.resolution().is_none() {
                debug!(parent: &self.span, device = %device.id(), "No resolution yet, skipping {}", action.name());
                continue;
            }

            let delay = stagger_delay(
                &mut rand::rng(),
                report.devices.len(),
                self.options.stagger_base,
                self.options.stagger_jitter,
            );
            let bridge = self.bridge.clone();
            let target = device.clone();
            let action = action.clone();
            let span = self.span.clone();

            let submitted = device.queue().enqueue(move || {
                async move {
                    tokio::time::sleep(delay).await;
                    perform(bridge.as_ref(), &target, &action).await.inspect_err(|e| {
                        warn!(device = %target.id(), "{} failed: {}", action.name(), e);
                    })
                }
                .instrument(span)
            });

            match submitted {
                Ok(_) => report.devices.push(device.id().to_string()),
                Err(e) => debug!(parent: &self.span, device = %device.id(), "Not submitted: {}", e),
            }
        }

        info!(
            parent: &self.span,
            group = group_id,
            "{} submitted to {} device(s)",
            action.name(),
            report.devices.len()
        );
        Ok(report)
    }
}

async fn perform(bridge: &dyn DeviceBridge, device: &Device, action: &Action) -> Result<(), FarmError> {
    let id = device.id();
    match action {
        Action::Tap { x, y, jitter_pct } => {
            let Some(resolution) = device.resolution() else {
                return Ok(());
            };
            let (px, py) = jittered_point(*x, *y, *jitter_pct, resolution);
            bridge.tap(id, px, py).await?;
        }
        Action::Swipe {
            from,
            to,
            duration_ms,
            jitter_pct,
        } => {
            let Some(resolution) = device.resolution() else {
                return Ok(());
            };
            let start = jittered_point(from.0, from.1, *jitter_pct, resolution);
            let end = jittered_point(to.0, to.1, *jitter_pct, resolution);
            bridge.swipe(id, start, end, *duration_ms).await?;
        }
        Action::Key(key) => bridge.key(id, key).await?,
        Action::Wake => bridge.wake(id).await?,
        Action::ScreenOff => bridge.screen_off(id).await?,
        Action::Shutdown => bridge.shutdown(id).await?,
    }
    Ok(())
}

fn jittered_point(x: f64, y: f64, jitter_pct: f64, resolution: Resolution) -> (u32, u32) {
    jittered_px(&mut rand::rng(), x, y, jitter_pct, resolution)
}
