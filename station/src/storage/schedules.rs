//! Schedule store

use async_trait::async_trait;
use tracing::warn;

use crate::errors::StationError;
use crate::filesys::file::File;
use crate::models::schedule::DeviceProfile;

/// Read-only access to per-device watering plans
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// IDs of every device that has a profile
    async fn devices(&self) -> Result<Vec<String>, StationError>;

    /// A device's schedules and soil-moisture target
    async fn device_profile(&self, device_id: &str) -> Result<DeviceProfile, StationError>;
}

/// One entry of the schedule file
enum StoredProfile {
    Valid(DeviceProfile),
    /// Unusable profile; reads for this device fail, other devices are unaffected
    Invalid { device_id: String, reason: String },
}

impl StoredProfile {
    fn device_id(&self) -> &str {
        match self {
            StoredProfile::Valid(profile) => &profile.device_id,
            StoredProfile::Invalid { device_id, .. } => device_id,
        }
    }
}

/// Schedule store backed by a JSON array of device profiles.
///
/// The file is re-read on every call so edits take effect on the next tick.
/// Each profile and each schedule is validated on its own.
pub struct FileScheduleStore {
    file: File,
}

impl FileScheduleStore {
    pub fn new(file: File) -> Self {
        Self { file }
    }

    async fn load(&self) -> Result<Vec<StoredProfile>, StationError> {
        if !self.file.exists().await {
            warn!("Schedule file {} does not exist", self.file.path().display());
            return Ok(Vec::new());
        }

        let entries: Vec<serde_json::Value> = self.file.read_json().await.map_err(|e| {
            StationError::StoreError(format!(
                "Unable to read schedules from {}: {e}",
                self.file.path().display()
            ))
        })?;

        let mut profiles = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            let Some(device_id) = entry.get("device_id").and_then(|id| id.as_str()).map(str::to_string)
            else {
                warn!("Ignoring schedule file entry {index}: no device_id");
                continue;
            };

            match DeviceProfile::from_value(entry) {
                Ok(profile) => {
                    for rejected in &profile.rejected {
                        warn!(
                            device_id = %device_id,
                            schedule_id = rejected.id.as_deref().unwrap_or("?"),
                            "Invalid schedule ignored: {}",
                            rejected.reason
                        );
                    }
                    profiles.push(StoredProfile::Valid(profile));
                }
                Err(e) => {
                    warn!(device_id = %device_id, "Invalid device profile: {}", e);
                    profiles.push(StoredProfile::Invalid {
                        device_id,
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(profiles)
    }
}

#[async_trait]
impl ScheduleStore for FileScheduleStore {
    async fn devices(&self) -> Result<Vec<String>, StationError> {
        Ok(self
            .load()
            .await?
            .iter()
            .map(|p| p.device_id().to_string())
            .collect())
    }

    async fn device_profile(&self, device_id: &str) -> Result<DeviceProfile, StationError> {
        match self.load().await?.into_iter().find(|p| p.device_id() == device_id) {
            Some(StoredProfile::Valid(profile)) => Ok(profile),
            Some(StoredProfile::Invalid { reason, .. }) => Err(StationError::StoreError(format!(
                "Invalid profile for device {device_id}: {reason}"
            ))),
            None => Err(StationError::StoreError(format!("No profile for device {device_id}"))),
        }
    }
}

/// In-memory schedule store
#[derive(Debug, Default)]
pub struct MemoryScheduleStore {
    profiles: Vec<DeviceProfile>,
}

impl MemoryScheduleStore {
    pub fn new(profiles: Vec<DeviceProfile>) -> Self {
        Self {
            profiles: profiles.into_iter().map(DeviceProfile::normalized).collect(),
        }
    }
}

#[async_trait]
impl ScheduleStore for MemoryScheduleStore {
    async fn devices(&self) -> Result<Vec<String>, StationError> {
        Ok(self.profiles.iter().map(|p| p.device_id.clone()).collect())
    }

    async fn device_profile(&self, device_id: &str) -> Result<DeviceProfile, StationError> {
        self.profiles
            .iter()
            .find(|p| p.device_id == device_id)
            .cloned()
            .ok_or_else(|| StationError::StoreError(format!("No profile for device {device_id}")))
    }
}
