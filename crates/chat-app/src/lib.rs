#![deny(unsafe_code)]

/// Startup wiring for the terminal chat.
pub mod app;
/// Line-oriented command loop.
pub mod repl;
/// Layered settings and their persistence.
pub mod settings;
pub mod telemetry;
