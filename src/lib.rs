//! cn-minethd - CryptoNight proof-of-work worker threads
//!
//! This crate provides the hashing core of a CPU miner:
//! - A work broadcast that hands each job to every worker exactly once
//! - Single-lane and batched worker loops with disjoint nonce ranges
//! - Per-thread hash-rate telemetry over short, medium and long windows
//! - Memory-policy aware context allocation and a startup self-test
//! - A launcher that pins threads and tracks them for shutdown

#![warn(missing_docs)]
#![deny(unsafe_code)]

/// Worker core: work items, broadcast, engine, workers and launcher
pub mod miner;

/// Statistics collection and reporting functionality
pub mod stats;

/// Utility functions and error handling
pub mod utils;

/// Command-line interface definitions
pub mod cli;

/// Configuration management
pub mod config;

/// Shared type definitions
pub mod types;

// Core exports
pub use cli::Commands;
pub use config::Config;
pub use miner::{
    CryptoNight, HashContext, HashEngine, JobId, MinerThreads, ResultSink, Share, WorkBroadcast,
    WorkItem, Worker, launch, self_test,
};
pub use stats::{HardwareStats, HashrateReport, StatsReporter, Telemetry};
pub use types::{AllocRequest, MemoryPolicy};
pub use utils::{MinerError, init_logging};
