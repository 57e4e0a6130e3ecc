//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::FarmError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Storage layout for the controller
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// One `<id>.json` per macro
    pub fn macros_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("macros"))
    }

    pub fn groups_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("groups"))
    }

    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs"))
    }

    /// Create the directories
    pub async fn setup(&self) -> Result<(), FarmError> {
        self.macros_dir().create().await?;
        self.groups_dir().create().await?;
        self.logs_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        // Use /etc/farmctl on Linux, or the user's home directory elsewhere
        #[cfg(target_os = "linux")]
        let base_dir = PathBuf::from("/etc/farmctl");

        #[cfg(not(target_os = "linux"))]
        let base_dir = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".farmctl");

        Self::new(base_dir)
    }
}
