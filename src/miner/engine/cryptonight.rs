// src/miner/engine/cryptonight.rs
//! CryptoNight engine
//!
//! Original CryptoNight (variant 0) through the `cryptonight` bindings. The
//! bindings hash in memory they allocate themselves. Each context still
//! reserves a scratchpad whose backing follows the memory policy, but only so
//! the allocator and the self-test can tell which memory mode was obtained;
//! hashing never touches it. The reference self-test vector is the
//! well-known `"This is a test"` digest.

use super::memory::Scratchpad;
use super::{Allocation, DIGEST_SIZE, HashContext, HashEngine};
use crate::types::AllocRequest;
use crate::utils::error::MinerError;
use cryptonight::cryptonight;
use hex_literal::hex;

const VARIANT: i32 = 0;

const SELF_TEST_INPUT: &[u8] = b"This is a test";
const SELF_TEST_DIGEST: [u8; DIGEST_SIZE] =
    hex!("a084f01d1437a09c6985401b60d43554ae105802c5f5d8a9b3253649c0be6605");

/// Whether the CPU has AES instructions
pub fn detect_hardware_aes() -> bool {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        std::arch::is_x86_feature_detected!("aes")
    }
    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    {
        false
    }
}

/// CryptoNight hash engine
#[derive(Debug, Clone)]
pub struct CryptoNight {
    hardware_aes: bool,
}

impl CryptoNight {
    /// Creates the engine
    ///
    /// # Arguments
    /// * `hardware_aes` - Whether the hardware-accelerated path is advertised
    pub fn new(hardware_aes: bool) -> Self {
        Self { hardware_aes }
    }
}

/// Context of one CryptoNight lane
pub struct CnContext {
    scratchpad: Scratchpad,
}

impl CnContext {
    #[cfg(test)]
    fn locked(&self) -> bool {
        self.scratchpad.is_locked()
    }
}

impl HashContext for CnContext {
    fn large_pages(&self) -> bool {
        self.scratchpad.is_large_pages()
    }
}

impl HashEngine for CryptoNight {
    type Context = CnContext;

    fn init(&self, request: AllocRequest) -> Result<(), MinerError> {
        if request.large_pages && !cfg!(target_os = "linux") {
            return Err(MinerError::AllocationFailed(
                "large pages are not supported on this platform".into(),
            ));
        }
        Ok(())
    }

    fn alloc_context(&self, request: AllocRequest) -> Result<Allocation<CnContext>, MinerError> {
        if !request.large_pages {
            return Ok(Allocation {
                context: CnContext {
                    scratchpad: Scratchpad::heap(),
                },
                warning: None,
            });
        }

        let (scratchpad, warning) =
            Scratchpad::large_pages(request.lock_pages).map_err(MinerError::AllocationFailed)?;
        Ok(Allocation {
            context: CnContext { scratchpad },
            warning,
        })
    }

    /// The bindings have a single code path, so `no_prefetch` has no effect
    fn hash(&self, _ctx: &mut CnContext, blob: &[u8], _no_prefetch: bool) -> [u8; DIGEST_SIZE] {
        let out = cryptonight(blob, blob.len(), VARIANT);
        let mut digest = [0u8; DIGEST_SIZE];
        digest.copy_from_slice(&out[..DIGEST_SIZE]);
        digest
    }

    fn hardware_acceleration(&self) -> bool {
        self.hardware_aes
    }

    fn self_test_vector(&self) -> (&'static [u8], [u8; DIGEST_SIZE]) {
        (SELF_TEST_INPUT, SELF_TEST_DIGEST)
    }
}
