//! End-to-end tests of the worker core over a SHA-256 engine

use cn_minethd::config::ThreadConfig;
use cn_minethd::miner::work::{NONCE_OFFSET, digest_value, target_for_difficulty};
use cn_minethd::miner::engine::Allocation;
use cn_minethd::{
    AllocRequest, Config, HashContext, HashEngine, JobId, MemoryPolicy, MinerError, Share,
    Telemetry, WorkBroadcast, WorkItem, launch, self_test,
};
use crossbeam_channel::{Receiver, unbounded};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct ShaContext {
    large_pages: bool,
}

impl HashContext for ShaContext {
    fn large_pages(&self) -> bool {
        self.large_pages
    }
}

struct ShaEngine {
    large_pages: bool,
}

impl HashEngine for ShaEngine {
    type Context = ShaContext;

    fn init(&self, _request: AllocRequest) -> Result<(), MinerError> {
        Ok(())
    }

    fn alloc_context(&self, request: AllocRequest) -> Result<Allocation<ShaContext>, MinerError> {
        if request.large_pages && !self.large_pages {
            return Err(MinerError::AllocationFailed("no huge pages".into()));
        }
        Ok(Allocation {
            context: ShaContext {
                large_pages: request.large_pages,
            },
            warning: None,
        })
    }

    fn hash(&self, _ctx: &mut ShaContext, blob: &[u8], _no_prefetch: bool) -> [u8; 32] {
        Sha256::digest(blob).into()
    }

    fn hardware_acceleration(&self) -> bool {
        true
    }

    fn self_test_vector(&self) -> (&'static [u8], [u8; 32]) {
        (b"This is a test", Sha256::digest(b"This is a test").into())
    }
}

fn threads(lanes: &[bool]) -> Config {
    Config {
        slow_memory: MemoryPolicy::Always,
        cpu_threads: lanes
            .iter()
            .map(|&low_power_mode| ThreadConfig {
                low_power_mode,
                no_prefetch: false,
                affine_to_cpu: None,
            })
            .collect(),
        ..Config::default()
    }
}

fn job(name: &str, difficulty: u64) -> WorkItem {
    let blob: Vec<u8> = (0..76u8).map(|b| b.wrapping_mul(7)).collect();
    WorkItem::new(
        JobId::new(name.as_bytes()).unwrap(),
        &blob,
        target_for_difficulty(difficulty),
        0,
    )
    .unwrap()
}

fn rehash(work: &WorkItem, nonce: u32) -> [u8; 32] {
    let mut blob = work.blob().to_vec();
    blob[NONCE_OFFSET..NONCE_OFFSET + 4].copy_from_slice(&nonce.to_le_bytes());
    Sha256::digest(&blob).into()
}

struct Rig {
    broadcast: Arc<WorkBroadcast>,
    telemetry: Arc<Telemetry>,
    shares: Receiver<Share>,
    threads: cn_minethd::MinerThreads,
}

fn start(config: &Config) -> Rig {
    let engine = Arc::new(ShaEngine { large_pages: false });
    self_test(&*engine, config).unwrap();

    let broadcast = Arc::new(WorkBroadcast::with_poll_interval(Duration::from_millis(5)));
    let telemetry = Arc::new(Telemetry::new(config.thread_count(), 1024).unwrap());
    let (tx, rx) = unbounded();
    let threads = launch(config, engine, broadcast.clone(), telemetry.clone(), Arc::new(tx)).unwrap();

    Rig {
        broadcast,
        telemetry,
        shares: rx,
        threads,
    }
}

impl Rig {
    fn stop(self) -> Vec<Share> {
        self.threads.request_stop();
        self.threads.join().unwrap();
        self.shares.try_iter().collect()
    }

    fn take(&self, n: usize) -> Vec<Share> {
        (0..n)
            .map(|_| self.shares.recv_timeout(Duration::from_secs(10)).unwrap())
            .collect()
    }
}

#[test]
fn single_thread_submits_only_qualifying_shares() {
    let rig = start(&threads(&[false]));
    let work = job("single", 1000);
    rig.broadcast.publish(work);

    let deadline = Instant::now() + Duration::from_secs(60);
    while rig
        .telemetry
        .samples(0)
        .last()
        .map_or(0, |s| s.hash_count)
        < 10_000
    {
        assert!(Instant::now() < deadline, "worker too slow");
        std::thread::sleep(Duration::from_millis(10));
    }

    let shares = rig.stop();
    assert!(!shares.is_empty(), "no share in 10k hashes at difficulty 1000");
    for share in shares {
        assert_eq!(share.job_id, work.job_id());
        assert!(digest_value(&share.result) < work.target());
        assert_eq!(share.result, rehash(&work, share.nonce));
    }
}

#[test]
fn dual_lane_thread_hashes_contiguous_nonces() {
    let rig = start(&threads(&[true]));
    let work = job("dual", 1);
    rig.broadcast.publish(work);

    let shares = rig.take(100);
    for pair in shares.windows(2) {
        assert_eq!(pair[1].nonce, pair[0].nonce.wrapping_add(1));
    }
    for share in &shares {
        assert_eq!(share.result, rehash(&work, share.nonce));
    }
    rig.stop();
}

#[test]
fn every_worker_moves_to_the_latest_job() {
    let rig = start(&threads(&[false, true, false]));
    let (a, b, c) = (job("a", 1), job("b", 1), job("c", 1));

    rig.broadcast.publish(a);
    rig.broadcast.publish(b);
    rig.broadcast.publish(c);

    let deadline = Instant::now() + Duration::from_secs(10);
    while rig.broadcast.consumed() < 3 {
        assert!(Instant::now() < deadline, "workers did not pick up the last job");
        std::thread::sleep(Duration::from_millis(5));
    }

    // Anything sent before the switch is already queued
    let _: Vec<Share> = rig.shares.try_iter().collect();
    for share in rig.take(300) {
        assert_eq!(share.job_id, c.job_id());
    }
    rig.stop();
}

#[test]
fn no_prefetch_on_slow_memory_aborts_startup() {
    let engine = ShaEngine { large_pages: false };
    let mut config = threads(&[false]);
    config.slow_memory = MemoryPolicy::Warn;
    config.cpu_threads[0].no_prefetch = true;

    let err = self_test(&engine, &config).unwrap_err();
    assert!(matches!(err, MinerError::ConfigConflict(_)));
    assert!(err.is_startup_fatal());
}

#[test]
fn stopped_threads_can_be_joined_while_stalled() {
    let rig = start(&threads(&[false, true]));
    std::thread::sleep(Duration::from_millis(20));
    assert!(rig.stop().is_empty());
}
