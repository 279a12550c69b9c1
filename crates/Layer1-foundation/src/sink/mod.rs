//! Line sinks - append-only destinations for aggregated log and stats text
//!
//! - [`FileSink`]: timestamped lines appended to a file
//! - [`MemorySink`]: lines kept in memory

use crate::{Error, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Timestamp layout prefixed to every file line
const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Destination for whole lines of text
///
/// Writers may call concurrently; each line lands intact.
#[async_trait]
pub trait LineSink: Send + Sync {
    async fn write_line(&self, line: &str) -> Result<()>;
}

// ============================================================================
// FileSink
// ============================================================================

/// Append-mode file sink
pub struct FileSink {
    file: Mutex<File>,
}

impl FileSink {
    /// Open (or create) `path` for appending
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    Error::Storage(format!("Failed to create {}: {}", parent.display(), e))
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| Error::Storage(format!("Failed to open {}: {}", path.display(), e)))?;

        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

#[async_trait]
impl LineSink for FileSink {
    async fn write_line(&self, line: &str) -> Result<()> {
        let stamped = format!(
            "{} {}\n",
            chrono::Local::now().format(TIMESTAMP_FORMAT),
            line
        );
        let mut file = self.file.lock().await;
        file.write_all(stamped.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

// ============================================================================
// MemorySink
// ============================================================================

/// In-memory sink
#[derive(Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far
    pub async fn lines(&self) -> Vec<String> {
        self.lines.lock().await.clone()
    }
}

#[async_trait]
impl LineSink for MemorySink {
    async fn write_line(&self, line: &str) -> Result<()> {
        self.lines.lock().await.push(line.to_string());
        Ok(())
    }
}
