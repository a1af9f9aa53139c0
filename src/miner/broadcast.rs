// src/miner/broadcast.rs
//! Work broadcast from the dispatcher to all workers
//!
//! One producer publishes [`WorkItem`]s; every worker polls the generation
//! counter once per hash and copies the shared item out when the counter
//! moves. The producer may only overwrite the shared item after every worker
//! has copied the previous one, so no worker can skip a generation.
//!
//! Both waits are coarse sleep-polls rather than condition variables: a
//! hand-off may take up to one poll interval, which is far below how often
//! a pool can produce new jobs. The hashing hot path pays one atomic load.

use crate::miner::work::WorkItem;
use arc_swap::ArcSwap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Sleep between polls of the producer barrier and of stalled workers
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shared (generation, consumption count, current work) triple
pub struct WorkBroadcast {
    /// Bumped once per publish; workers compare against their local copy
    generation: AtomicU64,
    /// Workers that copied the current generation
    consumed: AtomicUsize,
    /// Barrier target, set once all workers are launched
    worker_count: AtomicUsize,
    /// The current work item
    work: ArcSwap<WorkItem>,
    poll_interval: Duration,
}

impl Default for WorkBroadcast {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkBroadcast {
    /// Creates a broadcast holding stall work at generation 0
    pub fn new() -> Self {
        Self::with_poll_interval(DEFAULT_POLL_INTERVAL)
    }

    /// Creates a broadcast with a custom poll interval
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        WorkBroadcast {
            generation: AtomicU64::new(0),
            consumed: AtomicUsize::new(0),
            worker_count: AtomicUsize::new(0),
            work: ArcSwap::from_pointee(WorkItem::stall()),
            poll_interval,
        }
    }

    /// Interval used by the barrier and by stalled workers
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Latest published generation
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Whether `local` still names the latest generation
    #[inline]
    pub fn is_current(&self, local: u64) -> bool {
        self.generation.load(Ordering::Acquire) == local
    }

    /// Number of acknowledgements of the current generation
    pub fn consumed(&self) -> usize {
        self.consumed.load(Ordering::SeqCst)
    }

    /// Number of workers the barrier waits for
    pub fn worker_count(&self) -> usize {
        self.worker_count.load(Ordering::SeqCst)
    }

    /// Sets the number of workers the barrier waits for
    pub fn set_worker_count(&self, count: usize) {
        self.worker_count.store(count, Ordering::SeqCst);
    }

    /// Returns to generation 0 with stall work, before a launch
    pub(crate) fn reset(&self) {
        self.work.store(Arc::new(WorkItem::stall()));
        self.consumed.store(0, Ordering::SeqCst);
        self.generation.store(0, Ordering::SeqCst);
    }

    /// Counts a worker as having consumed the current generation
    ///
    /// Called once when a worker starts with its initial copy.
    pub fn acknowledge(&self) {
        self.consumed.fetch_add(1, Ordering::SeqCst);
    }

    /// The current work item
    pub fn current(&self) -> WorkItem {
        **self.work.load()
    }

    /// Publishes new work
    ///
    /// Blocks until every worker acknowledged the previous generation, then
    /// stores the work, resets the count and bumps the generation, in that
    /// order, so a new generation number is never paired with old data.
    pub fn publish(&self, work: WorkItem) {
        while self.consumed.load(Ordering::SeqCst) < self.worker_count.load(Ordering::SeqCst) {
            std::thread::sleep(self.poll_interval);
        }

        self.work.store(Arc::new(work));
        self.consumed.store(0, Ordering::SeqCst);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        log::debug!(
            "Published job {} as generation {} (stall: {})",
            work.job_id(),
            generation,
            work.is_stall()
        );
    }

    /// Copies the current work if `local` is stale
    ///
    /// On success the caller's generation is updated and the consumption is
    /// counted towards the producer's barrier.
    pub fn try_consume(&self, local: &mut u64) -> Option<WorkItem> {
        let published = self.generation.load(Ordering::SeqCst);
        if published == *local {
            return None;
        }

        let work = **self.work.load();
        self.consumed.fetch_add(1, Ordering::SeqCst);
        *local = published;
        Some(work)
    }
}
