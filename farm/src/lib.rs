//! farmctl Library
//!
//! Core modules for the device farm controller.

pub mod agent;
pub mod app;
pub mod bridge;
pub mod device;
pub mod errors;
pub mod fanout;
pub mod filesys;
pub mod gateway;
pub mod jitter;
pub mod library;
pub mod logs;
pub mod macros;
pub mod registry;
pub mod server;
pub mod storage;
pub mod utils;
pub mod workers;
