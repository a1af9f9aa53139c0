// src/main.rs
use clap::Parser;
use cn_minethd::miner::work::target_for_difficulty;
use cn_minethd::utils::logging::init_bench_logging;
use cn_minethd::{self, *};
use crossbeam_channel::unbounded;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

/// Interval between benchmark hash-rate reports
const BENCH_REPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Main entry point
///
/// Parses command line arguments and delegates to the subcommand handler.
fn main() -> Result<(), MinerError> {
    let cli = cli::Commands::parse();

    match cli.action {
        cli::Action::SelfTest(opts) => run_self_test(opts),
        cli::Action::Benchmark(opts) => run_benchmark(opts),
        cli::Action::Config(opts) => generate_config(opts),
    }
}

/// Loads the configuration file, or defaults, and applies the CLI overrides
///
/// Without a file the default threads follow the memory policy, so that
/// `-m always` does not ask for `no_prefetch`.
fn load_config(
    path: Option<PathBuf>,
    slow_memory: Option<MemoryPolicy>,
    threads: Option<usize>,
    no_prefetch: Option<bool>,
) -> Result<Config, MinerError> {
    let from_file = path.is_some();
    let mut config = match path {
        Some(path) => config::load(path)?,
        None => Config::default(),
    };
    if let Some(policy) = slow_memory {
        config.slow_memory = policy;
    }
    match threads {
        Some(count) => config.set_thread_count(count),
        None if !from_file => config.set_thread_count(config.thread_count()),
        None => {}
    }
    if let Some(no_prefetch) = no_prefetch {
        config.set_no_prefetch(no_prefetch);
    }
    config.validate()?;
    Ok(config)
}

/// Runs the startup self-test and reports the outcome
fn run_self_test(opts: cli::SelfTestOptions) -> Result<(), MinerError> {
    utils::init_logging();

    let config = load_config(opts.config, opts.slow_memory, None, opts.no_prefetch)?;
    let engine = CryptoNight::new(config.hardware_aes());
    self_test(&engine, &config)
}

/// Hashes a synthetic job on the configured threads
///
/// # Operations
/// 1. Runs the self-test
/// 2. Launches the workers and publishes one job
/// 3. Logs hash rates until the duration is over
/// 4. Stops and joins every thread
fn run_benchmark(opts: cli::BenchmarkOptions) -> Result<(), MinerError> {
    init_bench_logging();

    let config = load_config(opts.config, opts.slow_memory, opts.threads, opts.no_prefetch)?;

    let engine = Arc::new(CryptoNight::new(config.hardware_aes()));
    self_test(&*engine, &config)?;

    let telemetry = Arc::new(Telemetry::new(config.thread_count(), config.telemetry_capacity)?);
    let broadcast = Arc::new(WorkBroadcast::new());
    let (share_sender, share_receiver) = unbounded::<Share>();

    // Ends once every worker dropped its sender
    let share_counter = std::thread::spawn(move || share_receiver.iter().count());

    let threads = launch(
        &config,
        engine,
        broadcast.clone(),
        telemetry.clone(),
        Arc::new(share_sender),
    )?;

    let stop_reporting = Arc::new(AtomicBool::new(false));
    let reporter = StatsReporter::new(telemetry, BENCH_REPORT_INTERVAL).start_reporting(stop_reporting.clone());

    log::info!(
        "Starting benchmark on {} threads for {} seconds",
        threads.len(),
        opts.duration
    );
    broadcast.publish(benchmark_work(opts.difficulty)?);
    std::thread::sleep(Duration::from_secs(opts.duration));

    threads.request_stop();
    threads.join()?;
    stop_reporting.store(true, std::sync::atomic::Ordering::SeqCst);
    reporter
        .join()
        .map_err(|_| MinerError::ThreadError("stats reporter panicked".into()))?;

    let shares = share_counter
        .join()
        .map_err(|_| MinerError::ThreadError("share counter panicked".into()))?;
    log::info!("Benchmark finished, {} shares at difficulty {}", shares, opts.difficulty);
    log::logger().flush(); // Ensure final results appear

    Ok(())
}

/// Block-header sized job with a zeroed nonce
fn benchmark_work(difficulty: u64) -> Result<WorkItem, MinerError> {
    let mut blob = [0u8; 76];
    blob[0] = 0x07;
    for (i, b) in blob[1..39].iter_mut().enumerate() {
        *b = i as u8;
    }
    WorkItem::new(
        JobId::new(b"benchmark")?,
        &blob,
        target_for_difficulty(difficulty),
        0,
    )
}

/// Writes the configuration template
fn generate_config(opts: cli::ConfigOptions) -> Result<(), MinerError> {
    utils::init_logging();

    let config = config::generate_template(opts.threads);
    std::fs::write(&opts.output, config)?;
    log::info!("Wrote configuration template to {}", opts.output.display());
    Ok(())
}
