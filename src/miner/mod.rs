// src/miner/mod.rs
//! Core hashing functionality
//!
//! This module contains everything between a published job and a found share:
//! - Work items, nonce layout and the work broadcast
//! - The hash engine interface and its CryptoNight backend
//! - Context allocation and the startup self-test
//! - Worker threads and their launcher

/// Work broadcast shared by the dispatcher and all workers
pub mod broadcast;

/// Hash context allocation under the memory policy
pub mod context;

/// Hash engine interface and implementations
pub mod engine;

/// Worker thread launcher
pub mod launcher;

/// Startup self-test
pub mod selftest;

/// Work items, shares and nonce arithmetic
pub mod work;

/// Worker thread state machine
pub mod worker;

// Re-export main components for cleaner imports
pub use self::broadcast::WorkBroadcast;
pub use self::engine::{CryptoNight, HashContext, HashEngine};
pub use self::launcher::{MinerThreads, launch};
pub use self::selftest::self_test;
pub use self::work::{JobId, Share, WorkItem};
pub use self::worker::{ResultSink, Worker, WorkerOptions};
