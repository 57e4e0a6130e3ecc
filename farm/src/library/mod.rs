//! Read-only access to device groups and recorded macros.
//!
//! Groups and macros are authored elsewhere; the core only reads them
//! through [`GroupSource`] and [`MacroSource`].

pub mod json;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::FarmError;
use crate::macros::model::MacroDefinition;

pub use json::JsonLibrary;
pub use memory::MemoryLibrary;

/// A named set of device identifiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub devices: Vec<String>,
}

impl Group {
    pub fn new<I, S>(id: impl Into<String>, devices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            devices: devices.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
pub trait GroupSource: Send + Sync {
    /// Fails with [`FarmError::NotFound`] for an unknown id
    async fn group(&self, group_id: &str) -> Result<Group, FarmError>;

    async fn groups(&self) -> Result<Vec<Group>, FarmError>;
}

#[async_trait]
pub trait MacroSource: Send + Sync {
    /// Fails with [`FarmError::NotFound`] for an unknown id
    async fn load_macro(&self, macro_id: &str) -> Result<MacroDefinition, FarmError>;
}
