//! Valve actuators

use tracing::info;

use crate::errors::StationError;
use crate::hardware::gpio::GpioPin;

/// The physical valve driver
pub trait Actuator: Send {
    fn open(&mut self) -> Result<(), StationError>;
    fn close(&mut self) -> Result<(), StationError>;
}

/// Valve relay on a GPIO line; high opens the valve
pub struct GpioValve {
    pin: GpioPin,
}

impl GpioValve {
    pub fn new(pin: u32) -> Result<Self, StationError> {
        Ok(Self {
            pin: GpioPin::output(pin)?,
        })
    }
}

impl Actuator for GpioValve {
    fn open(&mut self) -> Result<(), StationError> {
        self.pin.set_high()
    }

    fn close(&mut self) -> Result<(), StationError> {
        self.pin.set_low()
    }
}

/// Stand-in for stations without a configured valve pin
#[derive(Debug, Default)]
pub struct LogActuator;

impl Actuator for LogActuator {
    fn open(&mut self) -> Result<(), StationError> {
        info!("Valve OPEN (no actuator configured)");
        Ok(())
    }

    fn close(&mut self) -> Result<(), StationError> {
        info!("Valve CLOSED (no actuator configured)");
        Ok(())
    }
}
