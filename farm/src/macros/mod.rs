//! Recorded macros and their playback

pub mod model;
pub mod player;
pub mod runs;

pub use model::{MacroDefinition, MacroMeta, MacroSettings, Randomize, Step, StepAction};
pub use player::{MacroEngine, PlayOptions, PlayReport, RunEvent, RunEventKind};
pub use runs::{ActiveRun, MacroRunState, RunRegistry};
