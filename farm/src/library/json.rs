//! Library backed by JSON documents on disk.
//!
//! ```text
//! <groups>/<any>.json   { "id", "name", "devices": [..] }
//! <macros>/<id>.json    { "meta": {..}, "steps": [..], "settings": {..} }
//! ```

use async_trait::async_trait;
use tracing::warn;

use crate::errors::FarmError;
use crate::filesys::Dir;
use crate::library::{Group, GroupSource, MacroSource};
use crate::macros::model::MacroDefinition;

pub struct JsonLibrary {
    groups_dir: Dir,
    macros_dir: Dir,
}

impl JsonLibrary {
    pub fn new(groups_dir: Dir, macros_dir: Dir) -> Self {
        Self {
            groups_dir,
            macros_dir,
        }
    }
}

/// Ids become file names, so anything that could escape the directory is
/// treated as unknown.
fn is_safe_id(id: &str) -> bool {
    !id.is_empty() && !id.contains(['/', '\\']) && id != "." && id != ".."
}

#[async_trait]
impl GroupSource for JsonLibrary {
    async fn group(&self, group_id: &str) -> Result<Group, FarmError> {
        if is_safe_id(group_id) {
            let file = self.groups_dir.file(&format!("{group_id}.json"));
            if let Some(group) = file.read_json_opt::<Group>().await? {
                if group.id == group_id {
                    return Ok(group);
                }
            }
        }

        self.groups()
            .await?
            .into_iter()
            .find(|g| g.id == group_id)
            .ok_or_else(|| FarmError::NotFound(format!("group {group_id}")))
    }

    async fn groups(&self) -> Result<Vec<Group>, FarmError> {
        let mut groups = Vec::new();
        for file in self.groups_dir.files_with_extension("json").await? {
            match file.read_json::<Group>().await {
                Ok(group) => groups.push(group),
                Err(e) => warn!("Skipping unreadable group file: {}", e),
            }
        }
        groups.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(groups)
    }
}

#[async_trait]
impl MacroSource for JsonLibrary {
    async fn load_macro(&self, macro_id: &str) -> Result<MacroDefinition, FarmError> {
        if !is_safe_id(macro_id) {
            return Err(FarmError::NotFound(format!("macro {macro_id}")));
        }
        self.macros_dir
            .file(&format!("{macro_id}.json"))
            .read_json_opt::<MacroDefinition>()
            .await?
            .ok_or_else(|| FarmError::NotFound(format!("macro {macro_id}")))
    }
}
