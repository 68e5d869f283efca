//! MQTT module

pub mod client;
pub mod topics;
