//! Recorded macro definitions

use serde::{Deserialize, Serialize};

fn default_press_ms() -> u64 {
    600
}

fn default_swipe_ms() -> u64 {
    300
}

/// One recorded input action. Coordinates are fractions of the screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum StepAction {
    Tap {
        x: f64,
        y: f64,
    },
    LongPress {
        x: f64,
        y: f64,
        #[serde(default = "default_press_ms")]
        duration_ms: u64,
    },
    Swipe {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        #[serde(default = "default_swipe_ms")]
        duration_ms: u64,
    },
    Key {
        key: String,
    },
    Text {
        text: String,
    },
    Wait {
        #[serde(default)]
        duration_ms: u64,
    },
}

impl StepAction {
    pub fn kind(&self) -> &'static str {
        match self {
            StepAction::Tap { .. } => "TAP",
            StepAction::LongPress { .. } => "LONG_PRESS",
            StepAction::Swipe { .. } => "SWIPE",
            StepAction::Key { .. } => "KEY",
            StepAction::Text { .. } => "TEXT",
            StepAction::Wait { .. } => "WAIT",
        }
    }
}

/// A step with the time elapsed since the previous one at recording time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    #[serde(flatten)]
    pub action: StepAction,

    #[serde(default)]
    pub dt_ms: u64,
}

impl Step {
    pub fn new(action: StepAction, dt_ms: u64) -> Self {
        Self { action, dt_ms }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroMeta {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Default randomisation, in percent
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Randomize {
    #[serde(default)]
    pub xy_jitter_pct: f64,
    #[serde(default)]
    pub delay_jitter_pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MacroSettings {
    #[serde(default)]
    pub randomize: Randomize,
}

/// A replayable macro
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroDefinition {
    pub meta: MacroMeta,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub settings: MacroSettings,
}

impl MacroDefinition {
    pub fn new(id: impl Into<String>, steps: Vec<Step>) -> Self {
        let id = id.into();
        Self {
            meta: MacroMeta {
                name: id.clone(),
                id,
                created_at: None,
            },
            steps,
            settings: MacroSettings::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.meta.id
    }
}
