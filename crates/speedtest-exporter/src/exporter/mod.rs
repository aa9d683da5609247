use crate::Result;
use prometheus::{Gauge, IntCounter, Opts};

pub mod bandwidth;
pub mod build_info;
pub mod collector;
pub mod runner;
pub mod scheduler;
pub mod store;

pub use collector::SpeedtestCollector;
pub use runner::MeasurementRunner;
pub use scheduler::Scheduler;
pub use store::ResultStore;

/// Metric state shared between the scheduler loop (which mutates it) and the
/// collector (which exposes it). Constructed once and injected; handles are
/// cheap clones of the same underlying series.
#[derive(Clone)]
pub struct ExporterMetrics {
    /// Seconds spent probing in the last pass that reached the probing phase.
    pub run_duration: Gauge,
    /// Seconds spent discovering caller info and targets in the last pass
    /// whose discovery completed.
    pub discovery_duration: Gauge,
    pub run_errors: IntCounter,
    pub runs: IntCounter,
}

impl ExporterMetrics {
    pub fn new() -> Result<Self> {
        Ok(Self {
            run_duration: Gauge::with_opts(Opts::new(
                "speedtest_run_duration_seconds",
                "Duration of the probing phase of the last measurement pass",
            ))?,
            discovery_duration: Gauge::with_opts(Opts::new(
                "speedtest_target_discovery_duration_seconds",
                "Duration of the discovery phase of the last measurement pass",
            ))?,
            run_errors: IntCounter::with_opts(Opts::new(
                "speedtest_run_errors_total",
                "Number of failed measurement passes",
            ))?,
            runs: IntCounter::with_opts(Opts::new(
                "speedtest_runs_total",
                "Number of successful measurement passes",
            ))?,
        })
    }
}
