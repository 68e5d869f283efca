//! Background workers

pub mod device;
pub mod ingest;
pub mod scheduler;
