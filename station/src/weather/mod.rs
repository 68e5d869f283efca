//! Weather module

pub mod forecast;
pub mod policy;
