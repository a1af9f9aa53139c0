// src/utils/mod.rs
//! Error handling and logging infrastructure shared by the whole crate.

/// Error types
///
/// Contains the [`MinerError`] enum covering startup failures, invalid
/// input and I/O.
pub mod error;

/// Logger initialization
pub mod logging;

pub use error::MinerError;
pub use logging::{init_bench_logging, init_logging};
