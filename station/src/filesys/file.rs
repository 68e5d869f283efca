//! File operations

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::warn;

use crate::errors::StationError;

/// A file wrapper with path
#[derive(Debug, Clone)]
pub struct File {
    path: PathBuf,
}

impl File {
    /// Create a new file reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the file exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }

    /// Read file contents as string
    pub async fn read_string(&self) -> Result<String, StationError> {
        let mut file = fs::File::open(&self.path).await?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).await?;
        Ok(contents)
    }

    /// Read file as JSON
    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T, StationError> {
        let contents = self.read_string().await?;
        let value = serde_json::from_str(&contents)?;
        Ok(value)
    }

    /// Read a JSON-lines file. A missing file reads as empty; blank lines are skipped.
    ///
    /// Lines that do not decode (a write cut short by a crash) are logged and
    /// skipped so one damaged entry does not hide the rest of the file.
    pub async fn read_json_lines<T: DeserializeOwned>(&self) -> Result<Vec<T>, StationError> {
        if !self.exists().await {
            return Ok(Vec::new());
        }

        let mut bytes = Vec::new();
        fs::File::open(&self.path).await?.read_to_end(&mut bytes).await?;
        let contents = String::from_utf8_lossy(&bytes);

        let mut items = Vec::new();
        for (index, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(item) => items.push(item),
                Err(e) => warn!(
                    "Skipping unreadable line {} of {}: {}",
                    index + 1,
                    self.path.display(),
                    e
                ),
            }
        }
        Ok(items)
    }

    /// Append one JSON value as a single line.
    ///
    /// A previous append that stopped mid-line is terminated first so the new
    /// entry starts on a line of its own.
    pub async fn append_json_line<T: Serialize>(&self, value: &T) -> Result<(), StationError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await?;

        let len = file.metadata().await?.len();
        if len > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::Start(len - 1)).await?;
            file.read_exact(&mut last).await?;
            if last[0] != b'\n' {
                line.insert(0, b'\n');
            }
        }

        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    /// Write JSON to file
    pub async fn write_json<T: Serialize>(&self, value: &T) -> Result<(), StationError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let contents = serde_json::to_string_pretty(value)?;
        self.write_atomic(contents.as_bytes()).await
    }

    /// Atomic write using a temporary file
    pub async fn write_atomic(&self, contents: &[u8]) -> Result<(), StationError> {
        let temp_path = self.path.with_extension("tmp");

        // Write to temp file
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);

        // Rename to target
        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}
