//! Application wiring for the server and device run modes

pub mod options;
pub mod run;
pub mod state;
