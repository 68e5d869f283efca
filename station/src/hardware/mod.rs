//! Hardware interfaces

pub mod gpio;
