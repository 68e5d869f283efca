//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::StationError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// On-disk layout of the station's file-backed stores
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Per-device watering plans
    pub fn schedules_file(&self) -> File {
        File::new(self.base_dir.join("schedules.json"))
    }

    /// One JSON-lines file of sensor readings per device
    pub fn telemetry_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("telemetry"))
    }

    /// One append-only JSON-lines file of decision records per device
    pub fn history_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("history"))
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), StationError> {
        self.telemetry_dir().create().await?;
        self.history_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        #[cfg(target_os = "linux")]
        let base_dir = PathBuf::from("/var/lib/agrosmart");

        #[cfg(not(target_os = "linux"))]
        let base_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".agrosmart");

        Self::new(base_dir)
    }
}

#[cfg(not(target_os = "linux"))]
mod dirs {
    use std::path::PathBuf;

    pub fn home_dir() -> Option<PathBuf> {
        std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
    }
}
