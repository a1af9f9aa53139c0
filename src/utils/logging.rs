// src/utils/logging.rs
//! Logging configuration
//!
//! Worker threads are named `miner-N`, so the thread name is part of every
//! line. Uses `env_logger` and respects `RUST_LOG`.

use env_logger::{Builder, Target};
use log::LevelFilter;
use std::env;

/// Initializes logging at Info, or whatever `RUST_LOG` asks for
pub fn init_logging() {
    let mut builder = common_log_config();
    builder.filter_level(LevelFilter::Info);
    if env::var("RUST_LOG").is_ok() {
        builder.parse_env("RUST_LOG");
    }
    let _ = builder.try_init();
}

/// Benchmark logging: Debug by default so found shares are visible
pub fn init_bench_logging() {
    let mut builder = common_log_config();

    if env::var("RUST_LOG").is_err() {
        builder.filter_level(LevelFilter::Debug);
    } else {
        builder.parse_env("RUST_LOG");
    }

    let _ = builder.try_init();
}

/// Base builder: `[ts level thread module:line] msg` on stdout
fn common_log_config() -> Builder {
    let mut builder = Builder::new();

    builder
        .format(|buf, record| {
            use std::io::Write;
            let ts = buf.timestamp_millis();
            let thread = std::thread::current();
            let module = record.module_path().unwrap_or_default();

            writeln!(
                buf,
                "[{} {} {} {}:{}] {}",
                ts,
                record.level(),
                thread.name().unwrap_or("-"),
                module,
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(Target::Stdout);

    builder
}
