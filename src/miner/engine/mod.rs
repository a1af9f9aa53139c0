// src/miner/engine/mod.rs
//! Hash engine interface
//!
//! The worker core only needs a handful of operations from the hash
//! transform: memory setup, per-thread contexts, single and batched hashing,
//! and a reference vector for the startup self-test. Contexts release their
//! memory when dropped.

/// CryptoNight backend
pub mod cryptonight;

/// Scratchpad memory backing CryptoNight contexts
pub mod memory;

pub use cryptonight::{CryptoNight, detect_hardware_aes};

use crate::types::AllocRequest;
use crate::utils::error::MinerError;

/// Size of one digest in bytes
pub const DIGEST_SIZE: usize = 32;

/// Per-thread hashing state owned by exactly one worker
pub trait HashContext: Send {
    /// Whether the context actually got large-page memory
    fn large_pages(&self) -> bool;
}

/// A freshly allocated context, plus the reason it is not what was asked for
pub struct Allocation<C> {
    /// The context
    pub context: C,
    /// Set when the allocation succeeded in a degraded form (e.g. unlocked)
    pub warning: Option<String>,
}

/// Common interface of hash engines
pub trait HashEngine: Send + Sync + 'static {
    /// Private per-thread state
    type Context: HashContext;

    /// One-time process setup for the requested memory mode
    ///
    /// # Errors
    /// `AllocationFailed` with the engine's reason when the mode is unavailable.
    fn init(&self, request: AllocRequest) -> Result<(), MinerError>;

    /// Allocates one context
    ///
    /// # Errors
    /// `AllocationFailed` when no context could be built for `request`.
    fn alloc_context(&self, request: AllocRequest) -> Result<Allocation<Self::Context>, MinerError>;

    /// Hashes `blob` into a 32-byte digest
    ///
    /// `no_prefetch` selects the engine's variant without memory prefetching.
    fn hash(&self, ctx: &mut Self::Context, blob: &[u8], no_prefetch: bool) -> [u8; DIGEST_SIZE];

    /// Hashes `ctxs.len()` lanes of `len` bytes each, laid out back to back in
    /// `blobs`, writing lane `i`'s digest to `out[32 * i..32 * (i + 1)]`
    fn hash_batch(
        &self,
        ctxs: &mut [Self::Context],
        blobs: &[u8],
        len: usize,
        no_prefetch: bool,
        out: &mut [u8],
    ) {
        for (lane, ctx) in ctxs.iter_mut().enumerate() {
            let digest = self.hash(ctx, &blobs[lane * len..(lane + 1) * len], no_prefetch);
            out[lane * DIGEST_SIZE..(lane + 1) * DIGEST_SIZE].copy_from_slice(&digest);
        }
    }

    /// Whether hardware-accelerated hashing is in use
    fn hardware_acceleration(&self) -> bool;

    /// Known input and its expected digest
    fn self_test_vector(&self) -> (&'static [u8], [u8; DIGEST_SIZE]);
}
