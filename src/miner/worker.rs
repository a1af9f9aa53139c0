// src/miner/worker.rs
//! Worker thread state machine
//!
//! A worker stalls while its work is a placeholder, mines while its
//! generation is current, and copies the new work when the generation
//! moves. Each hash writes the next nonce into the blob, hashes it and
//! forwards digests below the target. The batched variant keeps one blob
//! copy per lane and hashes all lanes in a single engine call.

use crate::miner::broadcast::WorkBroadcast;
use crate::miner::engine::{DIGEST_SIZE, HashEngine};
use crate::miner::work::{
    MAX_BLOB_SIZE, Share, WorkItem, digest_value, lane_nonce, nicehash_nonce, read_nonce,
    start_nonce, write_nonce,
};
use crate::stats::telemetry::{Telemetry, now_ms};
use crate::utils::error::MinerError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// Hashes (or batches) between two telemetry samples, minus one
const SAMPLE_MASK: u64 = 0x7;

/// Receiver of shares, fire-and-forget
pub trait ResultSink: Send + Sync {
    /// Hands a share over; the worker does not wait for any outcome
    fn submit(&self, share: Share);
}

impl ResultSink for crossbeam_channel::Sender<Share> {
    fn submit(&self, share: Share) {
        if let Err(e) = self.send(share) {
            log::warn!("{}", MinerError::from(e));
        }
    }
}

/// Per-thread settings fixed at launch
#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    /// Index of this thread
    pub thread_no: usize,
    /// Total number of threads, used to partition the nonce space
    pub thread_count: usize,
    /// Use the engine's no-prefetch variant
    pub no_prefetch: bool,
    /// Yield the CPU after every hash or batch
    pub yield_cpu: bool,
}

/// One worker's private state
pub struct Worker<E: HashEngine> {
    options: WorkerOptions,
    engine: Arc<E>,
    broadcast: Arc<WorkBroadcast>,
    telemetry: Arc<Telemetry>,
    sink: Arc<dyn ResultSink>,
    quit: Arc<AtomicBool>,
    /// Local copy of the work being mined
    work: WorkItem,
    /// Generation `work` belongs to
    generation: u64,
    /// Hashes computed since the thread started
    hash_count: u64,
}

impl<E: HashEngine> Worker<E> {
    /// Creates a worker holding the broadcast's current work
    pub fn new(
        options: WorkerOptions,
        engine: Arc<E>,
        broadcast: Arc<WorkBroadcast>,
        telemetry: Arc<Telemetry>,
        sink: Arc<dyn ResultSink>,
        quit: Arc<AtomicBool>,
    ) -> Self {
        let work = broadcast.current();
        let generation = broadcast.generation();
        Worker {
            options,
            engine,
            broadcast,
            telemetry,
            sink,
            quit,
            work,
            generation,
            hash_count: 0,
        }
    }

    /// Mines one lane per engine call until asked to quit
    ///
    /// The context is released when this returns.
    pub fn run_single(mut self, mut ctx: E::Context) {
        self.broadcast.acknowledge();

        'outer: while !self.quit_requested() {
            if self.work.is_stall() {
                if !self.wait_for_work() {
                    break;
                }
                continue;
            }

            let work = self.work;
            let size = work.work_size();
            let offset = work.nonce_field_offset();
            let mut blob = [0u8; MAX_BLOB_SIZE];
            blob[..size].copy_from_slice(work.blob());
            let mut nonce = self.first_nonce(work.nonce());

            while self.broadcast.is_current(self.generation) {
                if self.hash_count & SAMPLE_MASK == 0 {
                    self.sample();
                }
                self.hash_count += 1;

                nonce = nonce.wrapping_add(1);
                write_nonce(&mut blob, offset, nonce);
                let digest = self.engine.hash(&mut ctx, &blob[..size], self.options.no_prefetch);

                if digest_value(&digest) < work.target() {
                    self.submit(&work, nonce, &digest);
                }

                if self.quit_requested() {
                    break 'outer;
                }
                if self.options.yield_cpu {
                    thread::yield_now();
                }
            }

            self.consume();
        }

        log::debug!("Thread {} stopped after {} hashes", self.options.thread_no, self.hash_count);
    }

    /// Mines `ctxs.len()` lanes per engine call until asked to quit
    ///
    /// One counter advances by the lane count per call; lane `i` hashes
    /// `counter - (lanes - i - 1)`, so lanes cover consecutive nonces.
    pub fn run_batched(mut self, mut ctxs: Vec<E::Context>) {
        let lanes = ctxs.len();
        let mut blobs = vec![0u8; MAX_BLOB_SIZE * lanes];
        let mut digests = vec![0u8; DIGEST_SIZE * lanes];
        let mut batches: u64 = 0;

        self.broadcast.acknowledge();
        let mut size = fill_lanes(&mut blobs, &self.work, lanes);

        'outer: while !self.quit_requested() {
            if self.work.is_stall() {
                if !self.wait_for_work() {
                    break;
                }
                size = fill_lanes(&mut blobs, &self.work, lanes);
                continue;
            }

            let work = self.work;
            let offset = work.nonce_field_offset();
            let mut counter = self.first_nonce(read_nonce(&blobs, offset));

            while self.broadcast.is_current(self.generation) {
                if batches & SAMPLE_MASK == 0 {
                    self.sample();
                }
                batches += 1;
                self.hash_count += lanes as u64;

                for lane in 0..lanes {
                    counter = counter.wrapping_add(1);
                    write_nonce(&mut blobs, lane * size + offset, counter);
                }
                self.engine.hash_batch(
                    &mut ctxs,
                    &blobs[..lanes * size],
                    size,
                    self.options.no_prefetch,
                    &mut digests,
                );

                for lane in 0..lanes {
                    let digest = &digests[lane * DIGEST_SIZE..(lane + 1) * DIGEST_SIZE];
                    if digest_value(digest) < work.target() {
                        self.submit(&work, lane_nonce(counter, lanes, lane), digest);
                    }
                }

                if self.quit_requested() {
                    break 'outer;
                }
                if self.options.yield_cpu {
                    thread::yield_now();
                }
            }

            self.consume();
            size = fill_lanes(&mut blobs, &self.work, lanes);
        }

        log::debug!("Thread {} stopped after {} hashes", self.options.thread_no, self.hash_count);
    }

    fn quit_requested(&self) -> bool {
        self.quit.load(Ordering::Relaxed)
    }

    /// Sleeps until a new generation shows up and consumes it
    ///
    /// Returns false if asked to quit while waiting.
    fn wait_for_work(&mut self) -> bool {
        while self.broadcast.is_current(self.generation) {
            if self.quit_requested() {
                return false;
            }
            thread::sleep(self.broadcast.poll_interval());
        }
        self.consume();
        true
    }

    fn consume(&mut self) {
        if let Some(work) = self.broadcast.try_consume(&mut self.generation) {
            self.work = work;
        }
    }

    fn first_nonce(&self, existing: u32) -> u32 {
        let WorkerOptions {
            thread_no,
            thread_count,
            ..
        } = self.options;
        if self.work.is_nicehash() {
            nicehash_nonce(existing, thread_no, thread_count, self.work.resume_count())
        } else {
            start_nonce(thread_no, thread_count, self.work.resume_count())
        }
    }

    fn sample(&self) {
        self.telemetry
            .record(self.options.thread_no, self.hash_count, now_ms());
    }

    fn submit(&self, work: &WorkItem, nonce: u32, digest: &[u8]) {
        let mut result = [0u8; DIGEST_SIZE];
        result.copy_from_slice(digest);
        log::debug!(
            "Thread {} found share for job {}: nonce {:08x}",
            self.options.thread_no,
            work.job_id(),
            nonce
        );
        self.sink.submit(Share {
            job_id: work.job_id(),
            nonce,
            result,
            pool_id: work.pool_id(),
        });
    }
}

/// Copies the work blob into every lane; returns the lane stride
fn fill_lanes(blobs: &mut [u8], work: &WorkItem, lanes: usize) -> usize {
    let size = work.work_size();
    for lane in 0..lanes {
        blobs[lane * size..(lane + 1) * size].copy_from_slice(work.blob());
    }
    size
}
