//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - JSON or pretty stdout formatting
//! - `RUST_LOG`-compatible environment filtering

pub mod logger;

pub use logger::init;
