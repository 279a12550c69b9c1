//! JSON file store

use crate::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Directory name used under the platform config dir
const APP_DIR: &str = "fleet";

/// Suffix of the scratch file a save writes before renaming
const TEMP_SUFFIX: &str = ".tmp";

/// JSON file store rooted at a base directory
#[derive(Debug, Clone)]
pub struct JsonStore {
    base_dir: PathBuf,
}

impl JsonStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Global settings (`<config_dir>/fleet/`)
    pub fn global() -> Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Cannot find config directory".to_string()))?
            .join(APP_DIR);
        Ok(Self::new(dir))
    }

    pub fn file_path(&self, filename: &str) -> PathBuf {
        self.base_dir.join(filename)
    }

    fn ensure_dir(&self) -> Result<()> {
        if !self.base_dir.exists() {
            std::fs::create_dir_all(&self.base_dir)
                .map_err(|e| Error::Storage(format!("Failed to create directory: {}", e)))?;
        }
        Ok(())
    }

    /// Load JSON
    pub fn load<T: DeserializeOwned>(&self, filename: &str) -> Result<T> {
        let path = self.file_path(filename);
        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Storage(format!("Failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Storage(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Load JSON, `None` when the file is absent
    pub fn load_optional<T: DeserializeOwned>(&self, filename: &str) -> Result<Option<T>> {
        let path = self.file_path(filename);
        if !path.exists() {
            return Ok(None);
        }
        self.load(filename).map(Some)
    }

    /// Save JSON, overwriting prior content
    ///
    /// The content goes to a sibling `.tmp` file first and is renamed over
    /// the target, so a crash mid-write never leaves a half-written file.
    pub fn save<T: Serialize>(&self, filename: &str, data: &T) -> Result<()> {
        self.ensure_dir()?;
        let path = self.file_path(filename);
        let temp_path = self.file_path(&format!("{}{}", filename, TEMP_SUFFIX));
        let content = serde_json::to_string_pretty(data)
            .map_err(|e| Error::Storage(format!("Failed to serialize: {}", e)))?;

        let write = |target: &Path| -> std::io::Result<()> {
            let mut file = File::create(target)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()
        };
        write(&temp_path).map_err(|e| {
            Error::Storage(format!("Failed to write {}: {}", temp_path.display(), e))
        })?;

        std::fs::rename(&temp_path, &path).map_err(|e| {
            let _ = std::fs::remove_file(&temp_path);
            Error::Storage(format!("Failed to replace {}: {}", path.display(), e))
        })
    }

    /// Whether the file exists
    pub fn exists(&self, filename: &str) -> bool {
        self.file_path(filename).exists()
    }

    /// Remove the file
    ///
    /// Removing an absent file is reported as [`Error::NotFound`].
    pub fn remove(&self, filename: &str) -> Result<()> {
        let path = self.file_path(filename);
        if !path.exists() {
            return Err(Error::NotFound(path.display().to_string()));
        }
        std::fs::remove_file(&path)
            .map_err(|e| Error::Storage(format!("Failed to remove {}: {}", path.display(), e)))
    }
}
