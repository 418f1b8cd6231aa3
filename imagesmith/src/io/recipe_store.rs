//! The single live build recipe on disk.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::debug;

use crate::errors::SmithError;

/// Owns the recipe file at a fixed path for the duration of a run.
#[derive(Debug, Clone)]
pub struct RecipeStore {
    path: PathBuf,
}

impl RecipeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Replace the recipe wholesale (temp file + rename, so readers never see
    /// a partial write).
    pub fn write(&self, text: &str) -> Result<()> {
        debug!(path = %self.path.display(), bytes = text.len(), "writing recipe");
        let parent = self
            .path
            .parent()
            .with_context(|| format!("recipe path missing parent {}", self.path.display()))?;
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, text)
            .with_context(|| format!("write temp recipe {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("replace recipe {}", self.path.display()))?;
        Ok(())
    }

    /// Current recipe text. Fails with [`SmithError::RecipeNotFound`] if none
    /// was ever written.
    pub fn read(&self) -> Result<String> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(text),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(SmithError::RecipeNotFound(self.path.clone()).into())
            }
            Err(err) => Err(err).with_context(|| format!("read recipe {}", self.path.display())),
        }
    }
}
