//! # fieldgroup
//!
//! Library half of the demo host binary: configuration loading and the CLI
//! commands. `main.rs` only installs logging and dispatches.

pub mod cli;
pub mod config;
