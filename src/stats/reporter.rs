// src/stats/reporter.rs
use crate::stats::telemetry::{Telemetry, now_ms};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use sysinfo::{Components, System};

/// Hash-rate windows reported for every thread, in milliseconds
pub const REPORT_WINDOWS_MS: [u64; 3] = [2_500, 60_000, 900_000];

/// Hash rates over the three report windows
pub type Rates = [Option<f64>; 3];

/// Hash rates of every thread plus their sum
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HashrateReport {
    /// Rates per thread, indexed by thread number
    pub threads: Vec<Rates>,
    /// Sum over the threads with a defined rate, per window
    pub totals: Rates,
    /// Highest total short-window rate seen so far
    pub highest: f64,
}

impl HashrateReport {
    /// Builds the report from per-thread rates
    pub fn from_threads(threads: Vec<Rates>, highest: f64) -> Self {
        let mut totals = [None; 3];
        for (w, total) in totals.iter_mut().enumerate() {
            *total = threads
                .iter()
                .filter_map(|rates| rates[w])
                .fold(None, |acc: Option<f64>, r| Some(acc.unwrap_or(0.0) + r));
        }
        let highest = totals[0].map_or(highest, |short| short.max(highest));
        HashrateReport {
            threads,
            totals,
            highest,
        }
    }
}

fn rate(r: Option<f64>) -> String {
    r.map_or_else(|| "(na)".to_string(), |r| format!("{:.1}", r))
}

impl fmt::Display for HashrateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "HASHRATE REPORT")?;
        writeln!(f, "| ID |    2.5s |     60s |     15m |")?;
        for (i, rates) in self.threads.iter().enumerate() {
            writeln!(
                f,
                "| {:>2} | {:>7} | {:>7} | {:>7} |",
                i,
                rate(rates[0]),
                rate(rates[1]),
                rate(rates[2])
            )?;
        }
        writeln!(
            f,
            "Totals: {} {} {} H/s",
            rate(self.totals[0]),
            rate(self.totals[1]),
            rate(self.totals[2])
        )?;
        write!(f, "Highest: {:.1} H/s", self.highest)
    }
}

/// Statistics related to hardware performance
#[derive(Debug, Clone)]
pub struct HardwareStats {
    /// Current CPU usage percentage (0-100)
    pub cpu_usage: f32,
    /// Memory currently in use (in bytes)
    pub memory_used: u64,
    /// Current CPU temperature in Celsius
    pub temperature: f32,
}

/// Reads worker telemetry and hardware sensors
pub struct StatsReporter {
    telemetry: Arc<Telemetry>,
    /// System information collector
    system: System,
    /// Hardware component information collector
    components: Components,
    /// Interval at which stats are reported
    report_interval: Duration,
    highest: f64,
}

impl StatsReporter {
    /// Creates a reporter over `telemetry`
    ///
    /// # Arguments
    /// * `telemetry` - Samples written by the workers
    /// * `report_interval` - How often [`StatsReporter::start_reporting`] logs
    pub fn new(telemetry: Arc<Telemetry>, report_interval: Duration) -> Self {
        StatsReporter {
            telemetry,
            system: System::new_all(),
            components: Components::new_with_refreshed_list(),
            report_interval,
            highest: 0.0,
        }
    }

    /// Rates of one thread over the report windows
    pub fn thread_rates(&self, thread: usize) -> Rates {
        self.thread_rates_at(thread, now_ms())
    }

    fn thread_rates_at(&self, thread: usize, now: u64) -> Rates {
        REPORT_WINDOWS_MS.map(|window| self.telemetry.estimate_rate_at(thread, window, now))
    }

    /// Current hash-rate report of every thread
    pub fn hashrate(&mut self) -> HashrateReport {
        self.hashrate_at(now_ms())
    }

    /// [`StatsReporter::hashrate`] against an explicit clock
    pub fn hashrate_at(&mut self, now: u64) -> HashrateReport {
        let threads = (0..self.telemetry.thread_count())
            .map(|t| self.thread_rates_at(t, now))
            .collect();
        let report = HashrateReport::from_threads(threads, self.highest);
        self.highest = report.highest;
        report
    }

    /// Gets the current hardware statistics
    ///
    /// This refreshes system information before returning the stats.
    pub fn get_hardware_stats(&mut self) -> HardwareStats {
        self.system.refresh_cpu_all();
        self.system.refresh_memory();
        self.components.refresh(true);

        let cpus = self.system.cpus();
        let cpu_usage = if cpus.is_empty() {
            0.0
        } else {
            cpus.iter().map(|c| c.cpu_usage()).sum::<f32>() / cpus.len() as f32
        };

        let temperature = self
            .components
            .iter()
            .find(|c| c.label().contains("CPU"))
            .and_then(|c| c.temperature())
            .unwrap_or(0.0);

        HardwareStats {
            cpu_usage,
            memory_used: self.system.used_memory(),
            temperature,
        }
    }

    /// Starts periodic reporting on a background thread
    ///
    /// The thread logs a report every interval until `stop` is set, then
    /// logs a last one and exits.
    pub fn start_reporting(self, stop: Arc<AtomicBool>) -> JoinHandle<()> {
        let mut reporter = self;
        std::thread::spawn(move || {
            let tick = Duration::from_millis(100).min(reporter.report_interval);
            let mut waited = Duration::ZERO;

            while !stop.load(Ordering::Relaxed) {
                std::thread::sleep(tick);
                waited += tick;
                if waited >= reporter.report_interval {
                    waited = Duration::ZERO;
                    reporter.log_report();
                }
            }
            reporter.log_report();
        })
    }

    fn log_report(&mut self) {
        let report = self.hashrate();
        let hw = self.get_hardware_stats();
        log::info!("{}", report);
        log::info!(
            "CPU: {:.1}% | Memory: {} MiB | Temp: {:.1}°C",
            hw.cpu_usage,
            hw.memory_used / (1024 * 1024),
            hw.temperature
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_skip_undefined_threads() {
        let report = HashrateReport::from_threads(
            vec![[Some(10.0), None, None], [Some(5.5), Some(4.0), None]],
            0.0,
        );
        assert_eq!(report.totals, [Some(15.5), Some(4.0), None]);
        assert_eq!(report.highest, 15.5);
    }

    #[test]
    fn highest_is_kept_when_rate_drops() {
        let report = HashrateReport::from_threads(vec![[Some(3.0), None, None]], 20.0);
        assert_eq!(report.highest, 20.0);
        let report = HashrateReport::from_threads(vec![[None, None, None]], 20.0);
        assert_eq!(report.totals[0], None);
        assert_eq!(report.highest, 20.0);
    }

    #[test]
    fn reports_rates_from_telemetry() {
        let telemetry = Arc::new(Telemetry::new(2, 64).unwrap());
        let base = 1_000_000u64;
        // thread 0 hashes 100 H/s for 5 s; thread 1 has no samples
        for i in 0..=10 {
            telemetry.record(0, i * 50, base + i * 500);
        }

        let mut reporter = StatsReporter::new(telemetry, Duration::from_secs(1));
        let report = reporter.hashrate_at(base + 5_000);
        assert_eq!(report.threads.len(), 2);

        let short = report.threads[0][0].unwrap();
        assert!((short - 100.0).abs() < 1e-9, "got {}", short);
        assert_eq!(report.threads[0][1], None);
        assert_eq!(report.threads[1], [None, None, None]);
        assert_eq!(report.totals[0], Some(short));
    }

    #[test]
    fn renders_missing_rates_as_na() {
        let report = HashrateReport::from_threads(vec![[Some(1.5), None, None]], 0.0);
        let text = report.to_string();
        assert!(text.contains("(na)"));
        assert!(text.contains("1.5"));
    }

    #[test]
    fn reporting_thread_stops_on_flag() {
        let telemetry = Arc::new(Telemetry::new(1, 16).unwrap());
        let stop = Arc::new(AtomicBool::new(false));
        let handle = StatsReporter::new(telemetry, Duration::from_millis(20)).start_reporting(stop.clone());
        std::thread::sleep(Duration::from_millis(50));
        stop.store(true, Ordering::SeqCst);
        handle.join().unwrap();
    }
}
