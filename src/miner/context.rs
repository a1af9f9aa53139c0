// src/miner/context.rs
//! Hash context allocation under the configured memory policy

use crate::miner::engine::{Allocation, HashEngine};
use crate::types::{AllocRequest, MemoryPolicy};
use crate::utils::error::MinerError;

/// Allocates one context following `policy`
///
/// Under the fatal policies (`never`, `no_mlck`) a failed allocation is
/// returned as `AllocationFailed`. Under `warn` the preferred memory is tried
/// first and plain memory once after that. Contexts release their memory on
/// drop, so callers never free by hand.
pub fn allocate_context<E: HashEngine>(
    engine: &E,
    policy: MemoryPolicy,
) -> Result<E::Context, MinerError> {
    match policy {
        MemoryPolicy::Never | MemoryPolicy::NoMlock => {
            match engine.alloc_context(policy.request()) {
                Ok(alloc) => Ok(degraded(alloc)),
                Err(e) => {
                    log::error!("MEMORY ALLOC FAILED: {}", e);
                    Err(e)
                }
            }
        }
        MemoryPolicy::Warn => match engine.alloc_context(policy.request()) {
            Ok(alloc) => Ok(degraded(alloc)),
            Err(e) => {
                log::warn!("MEMORY ALLOC FAILED: {}, falling back to slow memory", e);
                engine
                    .alloc_context(AllocRequest::SLOW)
                    .map(degraded)
                    .inspect_err(|e| log::error!("MEMORY ALLOC FAILED: {}", e))
            }
        },
        MemoryPolicy::Always => engine.alloc_context(AllocRequest::SLOW).map(degraded),
    }
}

/// Allocates `count` contexts; on failure the ones already built are dropped
pub fn allocate_contexts<E: HashEngine>(
    engine: &E,
    policy: MemoryPolicy,
    count: usize,
) -> Result<Vec<E::Context>, MinerError> {
    (0..count).map(|_| allocate_context(engine, policy)).collect()
}

fn degraded<C>(alloc: Allocation<C>) -> C {
    if let Some(warning) = alloc.warning {
        log::warn!("MEMORY ALLOC DEGRADED: {}", warning);
    }
    alloc.context
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted engine for allocator and self-test tests

    use super::*;
    use crate::miner::engine::{DIGEST_SIZE, HashContext};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub struct FakeContext {
        pub large_pages: bool,
        live: Arc<AtomicUsize>,
    }

    impl HashContext for FakeContext {
        fn large_pages(&self) -> bool {
            self.large_pages
        }
    }

    impl Drop for FakeContext {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Engine whose memory behaviour and digests are set by the test
    pub struct FakeEngine {
        pub large_pages_available: bool,
        pub init_fails: bool,
        /// Fail every allocation after this many succeeded
        pub fail_after: Option<usize>,
        pub hardware: bool,
        /// XOR applied to digests, simulating a miscompiled engine
        pub corrupt: u8,
        /// XOR applied only to batched digests
        pub corrupt_batch: u8,
        pub allocated: AtomicUsize,
        pub live: Arc<AtomicUsize>,
        /// Hashes requested with and without `no_prefetch`
        pub no_prefetch_hashes: AtomicUsize,
        pub prefetch_hashes: AtomicUsize,
    }

    impl Default for FakeEngine {
        fn default() -> Self {
            FakeEngine {
                large_pages_available: true,
                init_fails: false,
                fail_after: None,
                hardware: false,
                corrupt: 0,
                corrupt_batch: 0,
                allocated: AtomicUsize::new(0),
                live: Arc::new(AtomicUsize::new(0)),
                no_prefetch_hashes: AtomicUsize::new(0),
                prefetch_hashes: AtomicUsize::new(0),
            }
        }
    }

    impl FakeEngine {
        pub fn live_contexts(&self) -> usize {
            self.live.load(Ordering::SeqCst)
        }

        fn digest(blob: &[u8]) -> [u8; DIGEST_SIZE] {
            let mut out = [0u8; DIGEST_SIZE];
            for (i, b) in out.iter_mut().enumerate() {
                *b = blob
                    .iter()
                    .enumerate()
                    .fold(i as u8, |acc, (j, &x)| acc.wrapping_mul(31).wrapping_add(x ^ j as u8));
            }
            out
        }
    }

    impl HashEngine for FakeEngine {
        type Context = FakeContext;

        fn init(&self, request: AllocRequest) -> Result<(), MinerError> {
            if self.init_fails && request.large_pages {
                return Err(MinerError::AllocationFailed("no large page privilege".into()));
            }
            Ok(())
        }

        fn alloc_context(&self, request: AllocRequest) -> Result<Allocation<FakeContext>, MinerError> {
            let n = self.allocated.fetch_add(1, Ordering::SeqCst);
            if self.fail_after.is_some_and(|limit| n >= limit) {
                return Err(MinerError::AllocationFailed("out of memory".into()));
            }
            if request.large_pages && !self.large_pages_available {
                return Err(MinerError::AllocationFailed("mmap failed".into()));
            }
            self.live.fetch_add(1, Ordering::SeqCst);
            Ok(Allocation {
                context: FakeContext {
                    large_pages: request.large_pages,
                    live: self.live.clone(),
                },
                warning: None,
            })
        }

        fn hash(&self, _ctx: &mut FakeContext, blob: &[u8], no_prefetch: bool) -> [u8; DIGEST_SIZE] {
            if no_prefetch {
                self.no_prefetch_hashes.fetch_add(1, Ordering::SeqCst);
            } else {
                self.prefetch_hashes.fetch_add(1, Ordering::SeqCst);
            }
            let mut digest = Self::digest(blob);
            digest[0] ^= self.corrupt;
            digest
        }

        fn hash_batch(
            &self,
            ctxs: &mut [FakeContext],
            blobs: &[u8],
            len: usize,
            no_prefetch: bool,
            out: &mut [u8],
        ) {
            for (lane, ctx) in ctxs.iter_mut().enumerate() {
                let mut digest = self.hash(ctx, &blobs[lane * len..(lane + 1) * len], no_prefetch);
                digest[31] ^= self.corrupt_batch;
                out[lane * DIGEST_SIZE..(lane + 1) * DIGEST_SIZE].copy_from_slice(&digest);
            }
        }

        fn hardware_acceleration(&self) -> bool {
            self.hardware
        }

        fn self_test_vector(&self) -> (&'static [u8], [u8; DIGEST_SIZE]) {
            (b"This is a test", Self::digest(b"This is a test"))
        }
    }
}
