// src/config/mod.rs
//! Configuration management
//!
//! Thread layout, memory policy and telemetry settings are read from a TOML
//! file. Anything missing falls back to one single-lane thread per logical
//! CPU on the `warn` memory policy.

/// Core configuration implementation
pub mod config;

pub use config::{Config, MAX_BATCH_WIDTH, ThreadConfig};

use crate::utils::error::MinerError;
use std::path::PathBuf;

/// Loads configuration from a TOML file
pub fn load(path: impl Into<PathBuf>) -> Result<Config, MinerError> {
    Config::load(path)
}

/// Generates a commented configuration template
pub fn generate_template(threads: usize) -> String {
    Config::generate_template(threads)
}
