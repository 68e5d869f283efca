//! GPIO output through the Linux sysfs interface
//!
//! Without the `hardware` feature the pin only logs its transitions, which is
//! what development machines and CI run with.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::StationError;

/// GPIO pin state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinState {
    Low,
    High,
}

impl PinState {
    fn as_sysfs(&self) -> &'static str {
        match self {
            PinState::Low => "0",
            PinState::High => "1",
        }
    }
}

impl From<bool> for PinState {
    fn from(value: bool) -> Self {
        if value {
            PinState::High
        } else {
            PinState::Low
        }
    }
}

impl From<PinState> for bool {
    fn from(state: PinState) -> Self {
        matches!(state, PinState::High)
    }
}

/// An exported output pin
#[derive(Debug)]
pub struct GpioPin {
    pin: u32,
    root: PathBuf,
    state: PinState,
}

impl GpioPin {
    /// Export `pin` as an output, driven low
    pub fn output(pin: u32) -> Result<Self, StationError> {
        Self::output_at(pin, "/sys/class/gpio")
    }

    /// Same as [`GpioPin::output`] under another sysfs root
    pub fn output_at(pin: u32, root: impl AsRef<Path>) -> Result<Self, StationError> {
        let mut gpio = Self {
            pin,
            root: root.as_ref().to_path_buf(),
            state: PinState::Low,
        };
        gpio.setup()?;
        gpio.write(PinState::Low)?;
        Ok(gpio)
    }

    /// Get pin number
    pub fn pin(&self) -> u32 {
        self.pin
    }

    /// Last written state
    pub fn state(&self) -> PinState {
        self.state
    }

    fn pin_dir(&self) -> PathBuf {
        self.root.join(format!("gpio{}", self.pin))
    }

    #[cfg(feature = "hardware")]
    fn setup(&mut self) -> Result<(), StationError> {
        let hw_err = |what: &str, e: std::io::Error| {
            StationError::HardwareError(format!("GPIO {} {what}: {e}", self.pin))
        };
        if !self.pin_dir().exists() {
            std::fs::write(self.root.join("export"), self.pin.to_string())
                .map_err(|e| hw_err("export", e))?;
        }
        std::fs::write(self.pin_dir().join("direction"), "out").map_err(|e| hw_err("direction", e))
    }

    #[cfg(not(feature = "hardware"))]
    fn setup(&mut self) -> Result<(), StationError> {
        debug!("GPIO {} configured as output at {} (simulated)", self.pin, self.pin_dir().display());
        Ok(())
    }

    /// Write pin state
    pub fn write(&mut self, state: PinState) -> Result<(), StationError> {
        #[cfg(feature = "hardware")]
        std::fs::write(self.pin_dir().join("value"), state.as_sysfs()).map_err(|e| {
            StationError::HardwareError(format!("GPIO {} write: {e}", self.pin))
        })?;

        debug!("GPIO {} <- {}", self.pin, state.as_sysfs());
        self.state = state;
        Ok(())
    }

    /// Set pin high
    pub fn set_high(&mut self) -> Result<(), StationError> {
        self.write(PinState::High)
    }

    /// Set pin low
    pub fn set_low(&mut self) -> Result<(), StationError> {
        self.write(PinState::Low)
    }
}
