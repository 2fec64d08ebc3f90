//! Infrastructure layer: configuration and logging wiring.

pub mod config;
pub mod logging;
