//! Device command interpreter and auto-shutoff timer

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use agrosmart_protocol::CommandMessage;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::device::actuator::Actuator;
use crate::device::state::{Arming, Valve, ValveState};
use crate::errors::StationError;
use crate::models::command::{Action, Addressing};

/// Turns received commands into valve transitions.
///
/// The valve state lives behind one lock shared with [`AutoShutoff`]. Every
/// transition publishes its arming on a watch channel while holding that lock,
/// so the timer always sees the latest deadline and never closes the valve for
/// a command that has since been superseded.
pub struct CommandInterpreter {
    identity: String,
    max_duration_secs: u32,
    valve: Arc<Mutex<Valve>>,
    arming_tx: watch::Sender<Option<Arming>>,
}

impl CommandInterpreter {
    /// Interpreter for the device `identity` plus the timer task that must run
    /// alongside it
    pub fn new(
        identity: impl Into<String>,
        max_duration_secs: u32,
        actuator: Box<dyn Actuator>,
    ) -> (Self, AutoShutoff) {
        let valve = Arc::new(Mutex::new(Valve::new(actuator)));
        let (arming_tx, arming_rx) = watch::channel(None);

        let interpreter = Self {
            identity: identity.into(),
            max_duration_secs,
            valve: valve.clone(),
            arming_tx,
        };
        let shutoff = AutoShutoff {
            valve,
            arming_rx,
        };
        (interpreter, shutoff)
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn state(&self) -> ValveState {
        lock(&self.valve).state()
    }

    /// Handle a raw payload from the command topic
    pub fn handle_payload(&self, payload: &[u8]) -> Result<ValveState, StationError> {
        let message: CommandMessage = serde_json::from_slice(payload)?;
        self.handle(&message)
    }

    /// Apply one command.
    ///
    /// Commands for other devices fail with `AddressMismatch` and unknown
    /// actions with `UnrecognizedAction`; neither touches the valve.
    pub fn handle(&self, message: &CommandMessage) -> Result<ValveState, StationError> {
        let target = Addressing::from_wire(message.device_id.as_deref());
        if !target.accepts(&self.identity) {
            return Err(StationError::AddressMismatch {
                target: target.device_id().unwrap_or_default().to_string(),
                identity: self.identity.clone(),
            });
        }

        match Action::from_wire(&message.action)? {
            Action::Activate => {}
        }

        let command_id = message.command_id.as_deref().unwrap_or("-");
        let origin = message.origin.as_deref().unwrap_or("-");
        let requested = message.duration.max(0);
        let duration = requested.min(i64::from(self.max_duration_secs));
        if duration < requested {
            warn!(
                command_id,
                requested,
                max = self.max_duration_secs,
                "Activation longer than the hard cap, clamped"
            );
        }

        let mut valve = lock(&self.valve);
        if duration > 0 {
            let deadline = Instant::now() + Duration::from_secs(duration as u64);
            let arming = valve.open_until(deadline);
            self.arming_tx.send_replace(Some(arming));
            info!(command_id, origin, duration, "Valve open");
        } else {
            valve.close();
            self.arming_tx.send_replace(None);
            info!(command_id, origin, "Valve closed by command");
        }
        Ok(valve.state())
    }

    /// Close the valve and disarm the timer
    pub fn close(&self) {
        let mut valve = lock(&self.valve);
        valve.close();
        self.arming_tx.send_replace(None);
    }
}

/// Closes the valve when the armed deadline passes, whether or not any further
/// message arrives.
pub struct AutoShutoff {
    valve: Arc<Mutex<Valve>>,
    arming_rx: watch::Receiver<Option<Arming>>,
}

impl AutoShutoff {
    /// Run until `shutdown_signal` resolves or the interpreter is dropped
    pub async fn run(mut self, mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>) {
        loop {
            let arming = *self.arming_rx.borrow_and_update();

            let expiry = async {
                match arming {
                    Some(arming) => {
                        tokio::time::sleep_until(arming.deadline).await;
                        Some(arming)
                    }
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = &mut shutdown_signal => {
                    debug!("Auto-shutoff timer stopping");
                    return;
                }
                changed = self.arming_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                Some(arming) = expiry => {
                    if lock(&self.valve).expire(arming, Instant::now()) {
                        info!("Valve closed by auto-shutoff");
                    }
                    // Wait for the next transition before re-arming
                    tokio::select! {
                        _ = &mut shutdown_signal => return,
                        changed = self.arming_rx.changed() => {
                            if changed.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        }
    }
}

/// The valve lock is never held across an await and a panic while holding it
/// leaves a consistent state, so a poisoned lock is recovered.
fn lock(valve: &Mutex<Valve>) -> MutexGuard<'_, Valve> {
    valve.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
