//! AgroSmart Station Library
//!
//! Irrigation scheduling, weather-aware command dispatch and the field-device
//! valve controller.

pub mod app;
pub mod device;
pub mod dispatch;
pub mod errors;
pub mod filesys;
pub mod hardware;
pub mod logs;
pub mod models;
pub mod mqtt;
pub mod recorder;
pub mod scheduler;
pub mod server;
pub mod storage;
pub mod utils;
pub mod weather;
pub mod workers;
