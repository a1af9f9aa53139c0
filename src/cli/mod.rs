//! Command-line interface definitions

/// Clap command tree
pub mod commands;

pub use commands::{Action, BenchmarkOptions, Commands, ConfigOptions, SelfTestOptions};
