// src/miner/selftest.rs
//! Startup self-test
//!
//! Runs once before any worker starts. It checks that the configured memory
//! policy can be honoured, that no thread asks for `no_prefetch` while
//! running on slow memory, and that the engine reproduces its reference
//! digest through both the single and the batched code paths.

use crate::config::Config;
use crate::miner::context::allocate_contexts;
use crate::miner::engine::{DIGEST_SIZE, HashContext, HashEngine};
use crate::utils::error::MinerError;

/// Contexts allocated by the self-test, enough for the widest batch
pub const SELF_TEST_CONTEXTS: usize = 5;

/// Validates engine and configuration
///
/// # Errors
/// * `AllocationFailed` - memory init or a context failed under a fatal policy
/// * `ConfigConflict` - a `no_prefetch` thread without large-page memory
/// * `SelfTestFailed` - a digest differs from the reference
pub fn self_test<E: HashEngine>(engine: &E, config: &Config) -> Result<(), MinerError> {
    let policy = config.memory_policy();

    if let Err(e) = engine.init(policy.request()) {
        log::error!("MEMORY INIT ERROR: {}", e);
        if policy.is_fatal() {
            return Err(e);
        }
    }

    // Dropped on every return below
    let mut ctxs = allocate_contexts(engine, policy, SELF_TEST_CONTEXTS)?;

    let has_large_pages = ctxs[0].large_pages() && ctxs[1].large_pages();
    for (i, thread) in config.cpu_threads.iter().enumerate() {
        if !has_large_pages && thread.no_prefetch {
            log::error!("Wrong config. You are running in slow memory mode with no_prefetch.");
            return Err(MinerError::ConfigConflict(format!(
                "thread {} sets no_prefetch but hash contexts run in slow memory",
                i
            )));
        }
    }

    let (input, expected) = engine.self_test_vector();
    let mut passed = engine.hash(&mut ctxs[0], input, false) == expected;

    if engine.hardware_acceleration() {
        passed &= engine.hash(&mut ctxs[0], input, true) == expected;
        passed &= batch_matches_reference(engine, &mut ctxs, config.batch_width, input, &expected);
        passed &= batch_matches_single(engine, &mut ctxs, config.batch_width);
    }

    if !passed {
        log::error!("Hash self-test failed. This might be caused by bad compiler optimizations.");
        return Err(MinerError::SelfTestFailed(
            "digest does not match the reference vector".into(),
        ));
    }

    log::info!(
        "Hash self-test passed ({} memory, hardware acceleration {})",
        if has_large_pages { "large page" } else { "slow" },
        if engine.hardware_acceleration() { "on" } else { "off" }
    );
    Ok(())
}

/// Every lane of a batch over copies of the reference input
fn batch_matches_reference<E: HashEngine>(
    engine: &E,
    ctxs: &mut [E::Context],
    lanes: usize,
    input: &[u8],
    expected: &[u8; DIGEST_SIZE],
) -> bool {
    let lanes = lanes.min(ctxs.len());
    let blobs = input.repeat(lanes);
    let mut out = vec![0u8; DIGEST_SIZE * lanes];
    engine.hash_batch(&mut ctxs[..lanes], &blobs, input.len(), true, &mut out);
    out.chunks(DIGEST_SIZE).all(|lane| lane == expected)
}

/// A batch of distinct inputs against the same inputs hashed one by one
fn batch_matches_single<E: HashEngine>(engine: &E, ctxs: &mut [E::Context], lanes: usize) -> bool {
    let lanes = lanes.min(ctxs.len());
    let inputs: Vec<[u8; 4]> = (0..lanes).map(|i| [b'n', b'a', b'd', b'a' + i as u8]).collect();

    let mut singles = vec![0u8; DIGEST_SIZE * lanes];
    for (i, input) in inputs.iter().enumerate() {
        let digest = engine.hash(&mut ctxs[0], input, true);
        singles[i * DIGEST_SIZE..(i + 1) * DIGEST_SIZE].copy_from_slice(&digest);
    }

    let blobs = inputs.concat();
    let mut out = vec![0u8; DIGEST_SIZE * lanes];
    engine.hash_batch(&mut ctxs[..lanes], &blobs, 4, true, &mut out);
    out == singles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThreadConfig;
    use crate::miner::context::testing::FakeEngine;
    use crate::types::MemoryPolicy;

    fn config(policy: MemoryPolicy, no_prefetch: bool) -> Config {
        Config {
            slow_memory: policy,
            cpu_threads: vec![
                ThreadConfig {
                    low_power_mode: false,
                    no_prefetch: false,
                    affine_to_cpu: None,
                },
                ThreadConfig {
                    low_power_mode: true,
                    no_prefetch,
                    affine_to_cpu: Some(1),
                },
            ],
            ..Config::default()
        }
    }

    #[test]
    fn passes_and_releases_contexts() {
        let engine = FakeEngine {
            hardware: true,
            ..Default::default()
        };
        self_test(&engine, &config(MemoryPolicy::Never, true)).unwrap();
        assert_eq!(engine.live_contexts(), 0);
    }

    #[test]
    fn no_prefetch_on_slow_memory_is_fatal() {
        let engine = FakeEngine {
            large_pages_available: false,
            ..Default::default()
        };
        let err = self_test(&engine, &config(MemoryPolicy::Warn, true)).unwrap_err();
        assert!(matches!(err, MinerError::ConfigConflict(_)));
        assert!(err.is_startup_fatal());
        assert_eq!(engine.live_contexts(), 0);
    }

    #[test]
    fn slow_memory_without_no_prefetch_is_fine() {
        let engine = FakeEngine {
            large_pages_available: false,
            ..Default::default()
        };
        self_test(&engine, &config(MemoryPolicy::Warn, false)).unwrap();
        self_test(&engine, &config(MemoryPolicy::Always, false)).unwrap();
    }

    #[test]
    fn digest_mismatch_fails_deterministically() {
        let engine = FakeEngine {
            corrupt: 0x01,
            ..Default::default()
        };
        for _ in 0..3 {
            let err = self_test(&engine, &config(MemoryPolicy::Never, false)).unwrap_err();
            assert!(matches!(err, MinerError::SelfTestFailed(_)));
        }
        assert_eq!(engine.live_contexts(), 0);
    }

    #[test]
    fn batch_path_checked_only_with_hardware_acceleration() {
        let soft = FakeEngine {
            corrupt_batch: 0x80,
            ..Default::default()
        };
        self_test(&soft, &config(MemoryPolicy::Never, false)).unwrap();

        let hard = FakeEngine {
            corrupt_batch: 0x80,
            hardware: true,
            ..Default::default()
        };
        let err = self_test(&hard, &config(MemoryPolicy::Never, false)).unwrap_err();
        assert!(matches!(err, MinerError::SelfTestFailed(_)));
    }

    #[test]
    fn init_failure_is_fatal_only_under_fatal_policies() {
        let engine = FakeEngine {
            init_fails: true,
            ..Default::default()
        };
        let err = self_test(&engine, &config(MemoryPolicy::Never, false)).unwrap_err();
        assert!(matches!(err, MinerError::AllocationFailed(_)));
        assert_eq!(engine.allocated.load(std::sync::atomic::Ordering::SeqCst), 0);

        self_test(&engine, &config(MemoryPolicy::Warn, false)).unwrap();
    }

    #[test]
    fn allocation_failure_midway_releases_earlier_contexts() {
        let engine = FakeEngine {
            fail_after: Some(3),
            ..Default::default()
        };
        let err = self_test(&engine, &config(MemoryPolicy::Never, false)).unwrap_err();
        assert!(matches!(err, MinerError::AllocationFailed(_)));
        assert_eq!(engine.live_contexts(), 0);
    }
}
