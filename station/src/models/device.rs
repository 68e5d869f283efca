//! Device identity

use crate::errors::StationError;

/// Longest accepted device ID
pub const MAX_DEVICE_ID_LEN: usize = 80;

/// Device IDs are 1-80 characters from `[A-Za-z0-9:_-]`.
///
/// The same rule guards both the HTTP surface and the per-device file names
/// of the stores, so an ID that passes can always be used as a path segment.
pub fn validate_device_id(device_id: &str) -> Result<(), StationError> {
    let valid_len = (1..=MAX_DEVICE_ID_LEN).contains(&device_id.len());
    let valid_chars = device_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '_' | '-'));

    if valid_len && valid_chars {
        Ok(())
    } else {
        Err(StationError::ValidationError(format!(
            "Invalid device_id {device_id:?}"
        )))
    }
}
