//! Domain models

pub mod command;
pub mod device;
pub mod forecast;
pub mod record;
pub mod schedule;
