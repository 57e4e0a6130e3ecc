//! File operations

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tokio::fs;

use crate::errors::FarmError;

/// A file wrapper with path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    path: PathBuf,
}

impl File {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name without its extension
    pub fn stem(&self) -> Option<&str> {
        self.path.file_stem().and_then(|s| s.to_str())
    }

    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    pub async fn read_string(&self) -> Result<String, FarmError> {
        Ok(fs::read_to_string(&self.path).await?)
    }

    /// Read and deserialize a JSON document
    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T, FarmError> {
        let contents = self.read_string().await?;
        serde_json::from_str(&contents).map_err(|e| {
            FarmError::ConfigError(format!("{}: {}", self.path.display(), e))
        })
    }

    /// Like [`File::read_json`], but a missing file yields `None`
    pub async fn read_json_opt<T: DeserializeOwned>(&self) -> Result<Option<T>, FarmError> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => serde_json::from_str(&contents).map(Some).map_err(|e| {
                FarmError::ConfigError(format!("{}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
