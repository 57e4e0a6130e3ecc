//! Global admission control for the external command channel

pub mod command;

pub use command::{CommandGateway, Options};
