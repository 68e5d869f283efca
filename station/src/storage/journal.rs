//! Per-device JSON-lines journals

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;

use crate::errors::StationError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::models::device::validate_device_id;

/// A directory holding one `<device_id>.jsonl` file per device.
///
/// Appends and reads are serialized so a reader never sees a half-written line.
pub struct Journal {
    dir: Dir,
    lock: Mutex<()>,
}

impl Journal {
    pub fn new(dir: Dir) -> Self {
        Self {
            dir,
            lock: Mutex::new(()),
        }
    }

    fn device_file(&self, device_id: &str) -> Result<File, StationError> {
        validate_device_id(device_id).map_err(|e| StationError::StoreError(e.to_string()))?;
        Ok(self.dir.file(&format!("{device_id}.jsonl")))
    }

    pub async fn append<T: Serialize>(&self, device_id: &str, item: &T) -> Result<(), StationError> {
        let file = self.device_file(device_id)?;
        let _guard = self.lock.lock().await;
        file.append_json_line(item)
            .await
            .map_err(|e| StationError::StoreError(format!("Append to {} failed: {e}", file.path().display())))
    }

    /// Every entry of a device in append order; an unknown device has none
    pub async fn read_all<T: DeserializeOwned>(&self, device_id: &str) -> Result<Vec<T>, StationError> {
        let file = self.device_file(device_id)?;
        let _guard = self.lock.lock().await;
        file.read_json_lines()
            .await
            .map_err(|e| StationError::StoreError(format!("Read of {} failed: {e}", file.path().display())))
    }
}
