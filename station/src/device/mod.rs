//! Field device: valve state machine, command interpreter and actuators

pub mod actuator;
pub mod interpreter;
pub mod state;
