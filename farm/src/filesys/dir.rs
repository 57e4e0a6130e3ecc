//! Directory operations

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::errors::FarmError;
use crate::filesys::file::File;

/// A directory wrapper with path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the directory (and parents)
    pub async fn create(&self) -> Result<(), FarmError> {
        fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    /// Files in this directory with the given extension, sorted by name.
    /// A missing directory has no files.
    pub async fn files_with_extension(&self, extension: &str) -> Result<Vec<File>, FarmError> {
        let mut entries = match fs::read_dir(&self.path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let matches = path.extension().and_then(|e| e.to_str()) == Some(extension);
            if matches && entry.file_type().await?.is_file() {
                files.push(path);
            }
        }
        files.sort();

        Ok(files.into_iter().map(File::new).collect())
    }

    /// Get a file within this directory
    pub fn file(&self, name: &str) -> File {
        File::new(self.path.join(name))
    }
}
