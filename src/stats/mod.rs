//! Statistics collection and reporting module
//!
//! Workers write hash-count samples into [`Telemetry`]; the
//! [`StatsReporter`] turns them into per-thread and total hash rates over
//! short, medium and long windows and adds hardware readings.

/// Per-thread sample rings and the rate estimator
pub mod telemetry;

/// Periodic hash-rate and hardware reports
pub mod reporter;

// Re-export main components
pub use reporter::{HardwareStats, HashrateReport, REPORT_WINDOWS_MS, StatsReporter};
pub use telemetry::{Telemetry, TelemetrySample};
