//! Macro playback across a group.
//!
//! Each eligible device gets its own playback task on its own queue. The
//! task walks the steps in order and evaluates the run's cancellation
//! predicate before every step, so a step is either executed whole or not
//! at all.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn, Instrument, Span};

use crate::agent::AgentLink;
use crate::bridge::DeviceBridge;
use crate::device::Device;
use crate::errors::FarmError;
use crate::fanout::{online_members, Options};
use crate::jitter::{jittered_px, scale_by_speed, stagger_delay, step_delay, DEFAULT_RESOLUTION};
use crate::library::{GroupSource, MacroSource};
use crate::macros::model::{MacroDefinition, StepAction};
use crate::macros::runs::{ActiveRun, MacroRunState, RunRegistry};
use crate::registry::DeviceRegistry;

const EVENT_CAPACITY: usize = 256;

/// Per-call playback tuning. Unset jitter falls back to the macro's own
/// randomisation settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayOptions {
    pub speed: f64,
    pub xy_jitter_pct: Option<f64>,
    pub delay_jitter_pct: Option<f64>,
}

impl Default for PlayOptions {
    fn default() -> Self {
        Self {
            speed: 1.0,
            xy_jitter_pct: None,
            delay_jitter_pct: None,
        }
    }
}

/// Returned as soon as playback tasks are submitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayReport {
    pub run_id: u64,
    pub started: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum RunEventKind {
    Started,
    Step { index: usize, kind: &'static str },
    Finished { cancelled: bool },
    Failed { error: String },
}

/// Progress of one device's playback
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEvent {
    pub run_id: u64,
    pub group_id: String,
    pub device_id: String,
    #[serde(flatten)]
    pub kind: RunEventKind,
}

pub struct MacroEngine {
    registry: Arc<DeviceRegistry>,
    groups: Arc<dyn GroupSource>,
    macros: Arc<dyn MacroSource>,
    bridge: Arc<dyn DeviceBridge>,
    agent: Arc<dyn AgentLink>,
    options: Options,
    runs: Arc<RunRegistry>,
    next_run_id: AtomicU64,
    events: broadcast::Sender<RunEvent>,
    span: Span,
}

impl MacroEngine {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        groups: Arc<dyn GroupSource>,
        macros: Arc<dyn MacroSource>,
        bridge: Arc<dyn DeviceBridge>,
        agent: Arc<dyn AgentLink>,
        options: Options,
        span: Span,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            registry,
            groups,
            macros,
            bridge,
            agent,
            options,
            runs: Arc::new(RunRegistry::new()),
            next_run_id: AtomicU64::new(1),
            events,
            span,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    pub fn runs(&self) -> &RunRegistry {
        &self.runs
    }

    pub fn active_runs(&self) -> Vec<ActiveRun> {
        self.runs.active()
    }

    /// Start `macro_id` on every ONLINE, idle member of the group.
    ///
    /// An unknown group or macro fails before any device is touched. Busy
    /// devices are skipped. Per-device outcomes are reported only through
    /// [`RunEvent`]s.
    pub async fn play_on_group(
        &self,
        group_id: &str,
        macro_id: &str,
        play: PlayOptions,
    ) -> Result<PlayReport, FarmError> {
        let group = self.groups.group(group_id).await?;
        let definition = Arc::new(self.macros.load_macro(macro_id).await?);

        let run_id = self.next_run_id.fetch_add(1, Ordering::SeqCst);

        let randomize = definition.settings.randomize;
        let tuning = Tuning {
            speed: play.speed,
            xy_jitter_pct: play.xy_jitter_pct.unwrap_or(randomize.xy_jitter_pct),
            delay_jitter_pct: play.delay_jitter_pct.unwrap_or(randomize.delay_jitter_pct),
        };

        let mut report = PlayReport {
            run_id,
            started: Vec::new(),
        };

        for device in online_members(&self.registry, &group) {
            let state = Arc::new(MacroRunState::new(run_id, group_id, device.id(), macro_id));
            if !self.runs.try_acquire(state.clone()) {
                debug!(parent: &self.span, device = %device.id(), "Already running a macro, skipping");
                continue;
            }

            let stagger = stagger_delay(
                &mut rand::rng(),
                report.started.len(),
                self.options.stagger_base,
                self.options.stagger_jitter,
            );
            let playback = Playback {
                guard: RunGuard {
                    runs: self.runs.clone(),
                    state,
                },
                device: device.clone(),
                definition: definition.clone(),
                bridge: self.bridge.clone(),
                agent: self.agent.clone(),
                events: self.events.clone(),
                tuning,
            };
            let span = self.span.clone();

            match device.queue().enqueue(move || playback.run(stagger).instrument(span)) {
                Ok(_) => report.started.push(device.id().to_string()),
                // The closure, and with it the guard, is already dropped
                Err(e) => debug!(parent: &self.span, device = %device.id(), "Not started: {}", e),
            }
        }

        info!(
            parent: &self.span,
            group = group_id,
            macro_id,
            run_id,
            "Macro started on {} device(s)",
            report.started.len()
        );
        Ok(report)
    }

    /// Stop every device of the group at its next step boundary.
    pub fn stop_group(&self, group_id: &str) -> usize {
        let stopped = self.runs.stop_group(group_id);
        info!(parent: &self.span, group = group_id, "Stop requested for {} run(s)", stopped);
        stopped
    }

    pub fn stop_device(&self, device_id: &str) -> bool {
        let stopped = self.runs.stop_device(device_id);
        if stopped {
            info!(parent: &self.span, device = device_id, "Stop requested");
        }
        stopped
    }

    pub fn stop_all(&self) -> usize {
        self.runs.stop_all()
    }
}

#[derive(Debug, Clone, Copy)]
struct Tuning {
    speed: f64,
    xy_jitter_pct: f64,
    delay_jitter_pct: f64,
}

/// Releases the run's lock and group entry however the task ends, including
/// when the queue drops it unstarted.
struct RunGuard {
    runs: Arc<RunRegistry>,
    state: Arc<MacroRunState>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.runs.finish(&self.state);
    }
}

struct Playback {
    guard: RunGuard,
    device: Arc<Device>,
    definition: Arc<MacroDefinition>,
    bridge: Arc<dyn DeviceBridge>,
    agent: Arc<dyn AgentLink>,
    events: broadcast::Sender<RunEvent>,
    tuning: Tuning,
}

impl Playback {
    async fn run(self, stagger: Duration) -> Result<(), FarmError> {
        tokio::time::sleep(stagger).await;
        self.emit(RunEventKind::Started);

        match self.steps().await {
            Ok(cancelled) => {
                if cancelled {
                    info!(device = %self.device.id(), "Macro cancelled");
                } else {
                    debug!(device = %self.device.id(), "Macro finished");
                }
                self.emit(RunEventKind::Finished { cancelled });
                Ok(())
            }
            Err(e) => {
                warn!(device = %self.device.id(), "Macro failed: {}", e);
                self.emit(RunEventKind::Failed { error: e.to_string() });
                Err(e)
            }
        }
    }

    /// Returns whether playback was cancelled before the last step.
    async fn steps(&self) -> Result<bool, FarmError> {
        let runs = &self.guard.runs;
        let state = &self.guard.state;
        let id = self.device.id();
        let mut last_touch: Option<(u32, u32)> = None;

        for (index, step) in self.definition.steps.iter().enumerate() {
            if runs.is_cancelled(state) {
                return Ok(true);
            }

            let delay = step_delay(
                &mut rand::rng(),
                step.dt_ms,
                self.tuning.speed,
                self.tuning.delay_jitter_pct,
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
                if runs.is_cancelled(state) {
                    return Ok(true);
                }
            }

            let resolution = self.device.resolution().unwrap_or(DEFAULT_RESOLUTION);
            let jitter = self.tuning.xy_jitter_pct;

            match &step.action {
                StepAction::Tap { x, y } => {
                    let (px, py) = jittered_px(&mut rand::rng(), *x, *y, jitter, resolution);
                    self.bridge.tap(id, px, py).await?;
                    last_touch = Some((px, py));
                }
                StepAction::LongPress { x, y, duration_ms } => {
                    let (px, py) = jittered_px(&mut rand::rng(), *x, *y, jitter, resolution);
                    self.bridge.long_press(id, px, py, *duration_ms).await?;
                    last_touch = Some((px, py));
                }
                StepAction::Swipe {
                    x1,
                    y1,
                    x2,
                    y2,
                    duration_ms,
                } => {
                    let from = jittered_px(&mut rand::rng(), *x1, *y1, jitter, resolution);
                    let to = jittered_px(&mut rand::rng(), *x2, *y2, jitter, resolution);
                    self.bridge.swipe(id, from, to, *duration_ms).await?;
                }
                StepAction::Key { key } => {
                    self.bridge.key(id, &key.to_ascii_uppercase()).await?;
                }
                StepAction::Text { text } => self.type_text(text, last_touch).await?,
                StepAction::Wait { duration_ms } => {
                    tokio::time::sleep(scale_by_speed(*duration_ms, self.tuning.speed)).await;
                }
            }

            self.emit(RunEventKind::Step {
                index,
                kind: step.action.kind(),
            });
        }
        Ok(false)
    }

    /// Deliver text through the agent, re-focusing the last touched point
    /// once if the field lost focus.
    async fn type_text(&self, text: &str, last_touch: Option<(u32, u32)>) -> Result<(), FarmError> {
        let id = self.device.id();
        match self.agent.input_text(id, text).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_focus_lost() => {
                let Some((px, py)) = last_touch else {
                    return Err(e.into());
                };
                debug!(device = %id, "Text field lost focus, tapping {},{} again", px, py);
                self.bridge.tap(id, px, py).await?;
                self.agent.input_text(id, text).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn emit(&self, kind: RunEventKind) {
        let state = &self.guard.state;
        let _ = self.events.send(RunEvent {
            run_id: state.run_id,
            group_id: state.group_id.clone(),
            device_id: state.device_id.clone(),
            kind,
        });
    }
}
