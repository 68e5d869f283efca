//! Build info, reconnect backoff and id helpers

use std::fmt::Write;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Build metadata baked in by `build.rs`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Reconnect backoff for the broker workers
#[derive(Debug, Clone)]
pub struct CooldownOptions {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for CooldownOptions {
    fn default() -> Self {
        // A station must be back on the broker before the next scheduler tick
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

/// Delay before reconnect attempt `attempt` (0-based), capped at `max_delay`
pub fn calc_exp_backoff(options: &CooldownOptions, attempt: u32) -> Duration {
    let exponent = attempt.min(i32::MAX as u32) as i32;
    let secs = options.base_delay.as_secs_f64() * options.multiplier.powi(exponent);
    if !secs.is_finite() || secs >= options.max_delay.as_secs_f64() {
        return options.max_delay;
    }
    Duration::from_secs_f64(secs)
}

pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// First 16 lowercase hex characters of the SHA-256 of `data`
pub fn short_hash(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    digest[..8].iter().fold(String::with_capacity(16), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}
