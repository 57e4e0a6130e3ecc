//! In-memory library

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::errors::FarmError;
use crate::library::{Group, GroupSource, MacroSource};
use crate::macros::model::MacroDefinition;

#[derive(Default)]
pub struct MemoryLibrary {
    groups: RwLock<HashMap<String, Group>>,
    macros: RwLock<HashMap<String, MacroDefinition>>,
}

impl MemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_group(&self, group: Group) {
        let mut groups = self.groups.write().unwrap_or_else(|e| e.into_inner());
        groups.insert(group.id.clone(), group);
    }

    pub fn insert_macro(&self, definition: MacroDefinition) {
        let mut macros = self.macros.write().unwrap_or_else(|e| e.into_inner());
        macros.insert(definition.meta.id.clone(), definition);
    }
}

#[async_trait]
impl GroupSource for MemoryLibrary {
    async fn group(&self, group_id: &str) -> Result<Group, FarmError> {
        let groups = self.groups.read().unwrap_or_else(|e| e.into_inner());
        groups
            .get(group_id)
            .cloned()
            .ok_or_else(|| FarmError::NotFound(format!("group {group_id}")))
    }

    async fn groups(&self) -> Result<Vec<Group>, FarmError> {
        let groups = self.groups.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<Group> = groups.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }
}

#[async_trait]
impl MacroSource for MemoryLibrary {
    async fn load_macro(&self, macro_id: &str) -> Result<MacroDefinition, FarmError> {
        let macros = self.macros.read().unwrap_or_else(|e| e.into_inner());
        macros
            .get(macro_id)
            .cloned()
            .ok_or_else(|| FarmError::NotFound(format!("macro {macro_id}")))
    }
}
