// src/cli/commands.rs
use crate::types::MemoryPolicy;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CryptoNight worker-thread core: self-test, benchmark and configuration
#[derive(Parser, Debug)]
#[command(name = "cn-minethd")]
#[command(version, about, long_about = None)]
pub struct Commands {
    /// The action to perform (self-test, benchmark, or generate config)
    #[command(subcommand)]
    pub action: Action,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Action {
    /// Check memory policy, thread config and hash engine, then exit
    SelfTest(SelfTestOptions),

    /// Hash a synthetic job on the configured threads and report hash rates
    Benchmark(BenchmarkOptions),

    /// Generate configuration file template
    Config(ConfigOptions),
}

/// Options for the startup self-test
#[derive(Parser, Debug)]
pub struct SelfTestOptions {
    /// Path to configuration file (defaults apply if absent)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Memory policy (overrides config)
    #[arg(short = 'm', long)]
    pub slow_memory: Option<MemoryPolicy>,

    /// Set no_prefetch on every thread (overrides config)
    #[arg(long)]
    pub no_prefetch: Option<bool>,
}

/// Options for running benchmarks
#[derive(Parser, Debug)]
pub struct BenchmarkOptions {
    /// Path to configuration file (defaults apply if absent)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Duration of benchmark in seconds
    #[arg(short, long, default_value_t = 60)]
    pub duration: u64,

    /// Number of single-lane threads to use (replaces the configured threads)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Memory policy (overrides config)
    #[arg(short = 'm', long)]
    pub slow_memory: Option<MemoryPolicy>,

    /// Set no_prefetch on every thread (overrides config)
    #[arg(long)]
    pub no_prefetch: Option<bool>,

    /// Target difficulty of the synthetic job
    #[arg(long, default_value_t = 10_000)]
    pub difficulty: u64,
}

/// Options for generating configuration files
#[derive(Parser, Debug)]
pub struct ConfigOptions {
    /// Output file path
    #[arg(short, long, default_value = "config.toml")]
    pub output: PathBuf,

    /// Number of thread entries to write
    #[arg(short, long, default_value_t = num_cpus::get())]
    pub threads: usize,
}
