// src/miner/launcher.rs
//! Worker thread launcher
//!
//! Builds one worker per configured thread, allocates its contexts and
//! starts it on its own OS thread. Every context is allocated before the
//! first thread starts, so a failing allocation leaves nothing running.

use crate::config::Config;
use crate::miner::broadcast::WorkBroadcast;
use crate::miner::context::allocate_contexts;
use crate::miner::engine::HashEngine;
use crate::miner::worker::{ResultSink, Worker, WorkerOptions};
use crate::stats::telemetry::Telemetry;
use crate::utils::error::MinerError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

/// Handles of the running worker threads
pub struct MinerThreads {
    handles: Vec<JoinHandle<()>>,
    quit: Arc<AtomicBool>,
}

impl MinerThreads {
    /// Number of running threads
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether no thread was started
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Asks every worker to stop after its current hash
    pub fn request_stop(&self) {
        self.quit.store(true, Ordering::SeqCst);
    }

    /// Waits for every worker to finish
    ///
    /// Workers only finish after [`MinerThreads::request_stop`].
    pub fn join(self) -> Result<(), MinerError> {
        let mut result = Ok(());
        for handle in self.handles {
            let name = handle.thread().name().unwrap_or("miner").to_string();
            if handle.join().is_err() {
                log::error!("Thread {} panicked", name);
                result = Err(MinerError::ThreadError(format!("{} panicked", name)));
            }
        }
        result
    }
}

/// Starts one worker per entry of `config.cpu_threads`
///
/// Resets the broadcast to stall work first; publish only after this
/// returns. Thread `i` records into telemetry slot `i`.
///
/// # Errors
/// * `ConfigError` - telemetry has fewer slots than threads
/// * `AllocationFailed` - a context could not be allocated under the policy
/// * `ThreadError` - the OS refused to spawn a thread
pub fn launch<E: HashEngine>(
    config: &Config,
    engine: Arc<E>,
    broadcast: Arc<WorkBroadcast>,
    telemetry: Arc<Telemetry>,
    sink: Arc<dyn ResultSink>,
) -> Result<MinerThreads, MinerError> {
    let thread_count = config.thread_count();
    if telemetry.thread_count() < thread_count {
        return Err(MinerError::ConfigError(format!(
            "telemetry tracks {} threads but {} are configured",
            telemetry.thread_count(),
            thread_count
        )));
    }

    broadcast.reset();
    let policy = config.memory_policy();

    let mut contexts = Vec::with_capacity(thread_count);
    for thread in &config.cpu_threads {
        contexts.push(allocate_contexts(&*engine, policy, thread.lanes(config.batch_width))?);
    }

    let quit = Arc::new(AtomicBool::new(false));
    let mut threads = MinerThreads {
        handles: Vec::with_capacity(thread_count),
        quit: quit.clone(),
    };

    for (i, (thread, ctxs)) in config.cpu_threads.iter().zip(contexts).enumerate() {
        let worker = Worker::new(
            WorkerOptions {
                thread_no: i,
                thread_count,
                no_prefetch: thread.no_prefetch,
                yield_cpu: config.yield_cpu,
            },
            engine.clone(),
            broadcast.clone(),
            telemetry.clone(),
            sink.clone(),
            quit.clone(),
        );

        let affinity = thread.affine_to_cpu;
        log::info!(
            "Starting {} thread, affinity: {}",
            if ctxs.len() > 1 { "batched" } else { "single" },
            affinity.map_or_else(|| "none".to_string(), |cpu| format!("CPU {}", cpu))
        );

        let spawned = thread::Builder::new()
            .name(format!("miner-{}", i))
            .spawn(move || {
                if let Some(cpu) = affinity {
                    pin_to_cpu(cpu);
                }
                if ctxs.len() > 1 {
                    worker.run_batched(ctxs);
                } else if let Some(ctx) = ctxs.into_iter().next() {
                    worker.run_single(ctx);
                }
            });

        match spawned {
            Ok(handle) => threads.handles.push(handle),
            Err(e) => {
                threads.request_stop();
                // Already running workers sit in the stall loop and see the flag
                let _ = threads.join();
                return Err(MinerError::ThreadError(format!(
                    "failed to spawn thread {}: {}",
                    i, e
                )));
            }
        }
    }

    broadcast.set_worker_count(thread_count);
    Ok(threads)
}

/// Pins the calling thread; failures are logged and mining continues
fn pin_to_cpu(cpu: usize) {
    if cfg!(target_os = "macos") {
        log::warn!("Thread affinity is only advisory on macOS");
    }
    if !core_affinity::set_for_current(core_affinity::CoreId { id: cpu }) {
        log::warn!("Could not pin thread to CPU {}", cpu);
    }
}
