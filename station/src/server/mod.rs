//! HTTP gateway: telemetry and history listings, manual commands

pub mod error;
pub mod handlers;
pub mod serve;
pub mod state;
