// src/types.rs
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Policy for the memory that backs hash contexts
///
/// Named after how willing the operator is to run on "slow memory", i.e.
/// ordinary pageable heap memory instead of locked large pages.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum MemoryPolicy {
    /// Never use slow memory: large pages with locking are required
    #[value(name = "never")]
    #[serde(rename = "never")]
    Never,

    /// Large pages are required, but are not locked into RAM
    #[value(name = "no_mlck")]
    #[serde(rename = "no_mlck")]
    NoMlock,

    /// Try locked large pages, warn and fall back to slow memory
    #[default]
    #[value(name = "warn")]
    #[serde(rename = "warn")]
    Warn,

    /// Always use slow memory
    #[value(name = "always")]
    #[serde(rename = "always")]
    Always,
}

/// What the engine is asked for when setting up memory
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AllocRequest {
    /// Back the context with large pages
    pub large_pages: bool,
    /// Lock the pages into RAM
    pub lock_pages: bool,
}

impl AllocRequest {
    /// Plain pageable memory
    pub const SLOW: AllocRequest = AllocRequest {
        large_pages: false,
        lock_pages: false,
    };
}

impl MemoryPolicy {
    /// The preferred request under this policy
    pub fn request(self) -> AllocRequest {
        match self {
            MemoryPolicy::Never | MemoryPolicy::Warn => AllocRequest {
                large_pages: true,
                lock_pages: true,
            },
            MemoryPolicy::NoMlock => AllocRequest {
                large_pages: true,
                lock_pages: false,
            },
            MemoryPolicy::Always => AllocRequest::SLOW,
        }
    }

    /// Whether failing to get the preferred memory aborts startup
    pub fn is_fatal(self) -> bool {
        matches!(self, MemoryPolicy::Never | MemoryPolicy::NoMlock)
    }
}

impl fmt::Display for MemoryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryPolicy::Never => write!(f, "never"),
            MemoryPolicy::NoMlock => write!(f, "no_mlck"),
            MemoryPolicy::Warn => write!(f, "warn"),
            MemoryPolicy::Always => write!(f, "always"),
        }
    }
}

impl FromStr for MemoryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "never" => Ok(MemoryPolicy::Never),
            "no_mlck" | "no_mlock" => Ok(MemoryPolicy::NoMlock),
            "warn" => Ok(MemoryPolicy::Warn),
            "always" => Ok(MemoryPolicy::Always),
            _ => Err(format!("Unknown slow_memory setting: {}", s)),
        }
    }
}
