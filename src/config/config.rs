// src/config/config.rs
use crate::miner::engine::detect_hardware_aes;
use crate::stats::telemetry::DEFAULT_CAPACITY;
use crate::types::MemoryPolicy;
use crate::utils::error::MinerError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Widest batch a low-power thread may hash per call
pub const MAX_BATCH_WIDTH: usize = 5;

/// Settings of one worker thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadConfig {
    /// Hash `batch_width` lanes per engine call instead of one
    #[serde(default)]
    pub low_power_mode: bool,

    /// Use the engine's variant without memory prefetching
    /// (requires large-page memory)
    #[serde(default = "default_no_prefetch")]
    pub no_prefetch: bool,

    /// Logical CPU to pin the thread to
    #[serde(default)]
    pub affine_to_cpu: Option<usize>,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        ThreadConfig {
            low_power_mode: false,
            no_prefetch: default_no_prefetch(),
            affine_to_cpu: None,
        }
    }
}

impl ThreadConfig {
    /// Number of lanes this thread hashes per engine call
    pub fn lanes(&self, batch_width: usize) -> usize {
        if self.low_power_mode { batch_width } else { 1 }
    }
}

/// Configuration of the hashing core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Memory policy for hash contexts
    #[serde(default)]
    pub slow_memory: MemoryPolicy,

    /// Force hardware-accelerated hashing on or off
    /// (default: detect from the CPU)
    #[serde(default)]
    pub aes_override: Option<bool>,

    /// Lanes per engine call for low-power threads
    #[serde(default = "default_batch_width")]
    pub batch_width: usize,

    /// Telemetry samples kept per thread (power of two)
    #[serde(default = "default_telemetry_capacity")]
    pub telemetry_capacity: usize,

    /// Yield the CPU after every hash or batch
    #[serde(default = "default_yield_cpu")]
    pub yield_cpu: bool,

    /// One entry per worker thread
    #[serde(default = "default_cpu_threads")]
    pub cpu_threads: Vec<ThreadConfig>,
}

fn default_no_prefetch() -> bool {
    true
}

fn default_batch_width() -> usize {
    2
}

fn default_telemetry_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_yield_cpu() -> bool {
    true
}

fn default_cpu_threads() -> Vec<ThreadConfig> {
    vec![ThreadConfig::default(); num_cpus::get()]
}

impl Default for Config {
    fn default() -> Self {
        Config {
            slow_memory: MemoryPolicy::default(),
            aes_override: None,
            batch_width: default_batch_width(),
            telemetry_capacity: default_telemetry_capacity(),
            yield_cpu: default_yield_cpu(),
            cpu_threads: default_cpu_threads(),
        }
    }
}

impl Config {
    /// Loads and validates a TOML configuration file
    ///
    /// # Errors
    /// `ConfigError` if the file can't be read, parsed or validated.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, MinerError> {
        let path = path.into();
        let config_str = std::fs::read_to_string(&path).map_err(|e| {
            MinerError::ConfigError(format!(
                "Failed to read config at {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_toml_str(&config_str)
    }

    /// Parses and validates a TOML configuration
    pub fn from_toml_str(s: &str) -> Result<Self, MinerError> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks ranges the rest of the crate relies on
    pub fn validate(&self) -> Result<(), MinerError> {
        if self.cpu_threads.is_empty() {
            return Err(MinerError::ConfigError("cpu_threads is empty".into()));
        }
        if !(2..=MAX_BATCH_WIDTH).contains(&self.batch_width) {
            return Err(MinerError::ConfigError(format!(
                "batch_width {} is outside 2..={}",
                self.batch_width, MAX_BATCH_WIDTH
            )));
        }
        if self.telemetry_capacity < 2 || !self.telemetry_capacity.is_power_of_two() {
            return Err(MinerError::ConfigError(format!(
                "telemetry_capacity {} is not a power of two",
                self.telemetry_capacity
            )));
        }
        Ok(())
    }

    /// Number of worker threads
    pub fn thread_count(&self) -> usize {
        self.cpu_threads.len()
    }

    /// Settings of thread `i`
    pub fn thread_config(&self, i: usize) -> Option<&ThreadConfig> {
        self.cpu_threads.get(i)
    }

    /// Memory policy for hash contexts
    pub fn memory_policy(&self) -> MemoryPolicy {
        self.slow_memory
    }

    /// Replaces the thread list with `count` single-lane threads
    ///
    /// `no_prefetch` is only set when the memory policy asks for large
    /// pages, since it is rejected on slow memory.
    pub fn set_thread_count(&mut self, count: usize) {
        let thread = ThreadConfig {
            no_prefetch: self.slow_memory.request().large_pages,
            ..ThreadConfig::default()
        };
        self.cpu_threads = vec![thread; count];
    }

    /// Sets `no_prefetch` on every thread
    pub fn set_no_prefetch(&mut self, no_prefetch: bool) {
        for thread in &mut self.cpu_threads {
            thread.no_prefetch = no_prefetch;
        }
    }

    /// Whether hardware-accelerated hashing should be used
    pub fn hardware_aes(&self) -> bool {
        self.aes_override.unwrap_or_else(detect_hardware_aes)
    }

    /// Generates a commented TOML template with `threads` worker entries
    pub fn generate_template(threads: usize) -> String {
        let mut template = String::new();
        template.push_str("# Hashing core configuration\n\n");
        template.push_str("# Memory for hash contexts: never, no_mlck, warn, always\n");
        template.push_str("#   never   - locked large pages only, fail otherwise\n");
        template.push_str("#   no_mlck - large pages without locking, fail otherwise\n");
        template.push_str("#   warn    - try locked large pages, fall back with a warning\n");
        template.push_str("#   always  - ordinary (slow) memory only\n");
        template.push_str("slow_memory = \"warn\"\n");
        template.push_str("# Force hardware-accelerated hashing on or off (default: detect)\n");
        template.push_str("# aes_override = true\n");
        template.push_str("# Lanes hashed per call by low_power_mode threads (2-5)\n");
        template.push_str("batch_width = 2\n");
        template.push_str("# Hash-rate samples kept per thread (power of two)\n");
        template.push_str(&format!("telemetry_capacity = {}\n", DEFAULT_CAPACITY));
        template.push_str("# Yield the CPU after every hash\n");
        template.push_str("yield_cpu = true\n");

        for i in 0..threads.max(1) {
            template.push_str("\n[[cpu_threads]]\n");
            template.push_str("low_power_mode = false\n");
            template.push_str("no_prefetch = true\n");
            template.push_str(&format!("affine_to_cpu = {}\n", i));
        }

        template
    }
}
