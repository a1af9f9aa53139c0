// src/utils/error.rs
use crate::miner::work::Share;
use std::io;
use thiserror::Error;

/// Main error type for the hashing core
///
/// Startup problems (self-test, memory policy, configuration contradictions)
/// are reported through the same enum as ordinary input and I/O errors;
/// [`MinerError::is_startup_fatal`] tells them apart.
#[derive(Error, Debug)]
pub enum MinerError {
    /// Configuration file or parameter errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Thread configuration that contradicts the memory the engine obtained
    #[error("Wrong config: {0}")]
    ConfigConflict(String),

    /// Hash context or engine memory could not be set up under the policy
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// The hash engine produced a digest different from the reference vector
    #[error("Self-test failed: {0}")]
    SelfTestFailed(String),

    /// Invalid work or parameter values
    #[error("Invalid input: {0}")]
    InputError(String),

    /// Worker thread could not be spawned
    #[error("Thread error: {0}")]
    ThreadError(String),

    /// Standard I/O operation errors
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// Thread communication channel errors
    #[error("Thread communication error: {0}")]
    ChannelError(String),
}

impl MinerError {
    /// Whether this error must abort startup before any worker runs
    pub fn is_startup_fatal(&self) -> bool {
        matches!(
            self,
            MinerError::ConfigConflict(_)
                | MinerError::AllocationFailed(_)
                | MinerError::SelfTestFailed(_)
        )
    }
}

/// Converts crossbeam channel send errors for Shares into MinerError
impl From<crossbeam_channel::SendError<Share>> for MinerError {
    fn from(e: crossbeam_channel::SendError<Share>) -> Self {
        MinerError::ChannelError(format!("Share send failed: {}", e))
    }
}

/// Converts TOML parse errors into MinerError
impl From<toml::de::Error> for MinerError {
    fn from(e: toml::de::Error) -> Self {
        MinerError::ConfigError(format!("Invalid config format: {}", e))
    }
}
