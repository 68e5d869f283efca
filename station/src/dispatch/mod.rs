//! Command dispatch: transport, publisher and the manual gateway

pub mod gateway;
pub mod publisher;
pub mod transport;
