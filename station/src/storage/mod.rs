//! Storage module

pub mod history;
pub mod journal;
pub mod layout;
pub mod page;
pub mod schedules;
pub mod settings;
pub mod telemetry;
