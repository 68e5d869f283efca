//! Valve actuation state machine

use tokio::time::Instant;
use tracing::error;

use crate::device::actuator::Actuator;

/// Valve level as the device believes it to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValveState {
    Closed,
    /// Open until `deadline`, then closed by the auto-shutoff timer
    Open { deadline: Instant },
}

impl ValveState {
    pub fn is_open(&self) -> bool {
        matches!(self, ValveState::Open { .. })
    }
}

/// A deadline handed to the auto-shutoff timer.
///
/// `generation` identifies the transition that armed it; a later transition
/// bumps the generation and thereby disarms every older timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arming {
    pub generation: u64,
    pub deadline: Instant,
}

/// The device's single actuation state and the actuator it drives
pub struct Valve {
    state: ValveState,
    generation: u64,
    actuator: Box<dyn Actuator>,
}

impl Valve {
    pub fn new(actuator: Box<dyn Actuator>) -> Self {
        Self {
            state: ValveState::Closed,
            generation: 0,
            actuator,
        }
    }

    pub fn state(&self) -> ValveState {
        self.state
    }

    /// Open (or keep open) until `deadline`, replacing any earlier deadline
    pub fn open_until(&mut self, deadline: Instant) -> Arming {
        self.generation += 1;
        if !self.state.is_open() {
            if let Err(e) = self.actuator.open() {
                error!("Failed to open valve: {}", e);
            }
        }
        self.state = ValveState::Open { deadline };
        Arming {
            generation: self.generation,
            deadline,
        }
    }

    /// Close immediately
    pub fn close(&mut self) {
        self.generation += 1;
        self.state = ValveState::Closed;
        // Driven even when already closed; closing is always safe
        if let Err(e) = self.actuator.close() {
            error!("Failed to close valve: {}", e);
        }
    }

    /// Timer expiry for `arming`. Closes only if no newer transition happened
    /// and the deadline has passed; returns whether it closed.
    pub fn expire(&mut self, arming: Arming, now: Instant) -> bool {
        match self.state {
            ValveState::Open { deadline }
                if self.generation == arming.generation && now >= deadline =>
            {
                self.close();
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;
    use crate::errors::StationError;

    #[derive(Clone, Default)]
    struct Levels(Arc<Mutex<Vec<bool>>>);

    impl Actuator for Levels {
        fn open(&mut self) -> Result<(), StationError> {
            self.0.lock().unwrap().push(true);
            Ok(())
        }

        fn close(&mut self) -> Result<(), StationError> {
            self.0.lock().unwrap().push(false);
            Ok(())
        }
    }

    #[test]
    fn test_stale_arming_does_not_close() {
        let levels = Levels::default();
        let mut valve = Valve::new(Box::new(levels.clone()));
        let t0 = Instant::now();

        let first = valve.open_until(t0 + Duration::from_secs(300));
        let second = valve.open_until(t0 + Duration::from_secs(700));

        assert!(!valve.expire(first, t0 + Duration::from_secs(300)));
        assert!(valve.state().is_open());

        assert!(!valve.expire(second, t0 + Duration::from_secs(699)));
        assert!(valve.expire(second, t0 + Duration::from_secs(700)));
        assert_eq!(valve.state(), ValveState::Closed);

        // Re-opening an open valve does not pulse the actuator
        assert_eq!(*levels.0.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn test_close_from_either_state() {
        let mut valve = Valve::new(Box::new(Levels::default()));
        valve.close();
        assert_eq!(valve.state(), ValveState::Closed);

        let arming = valve.open_until(Instant::now() + Duration::from_secs(60));
        valve.close();
        assert_eq!(valve.state(), ValveState::Closed);
        assert!(!valve.expire(arming, arming.deadline));
    }
}
