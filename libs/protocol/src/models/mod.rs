//! Wire models

pub mod api;
pub mod command;
pub mod telemetry;
