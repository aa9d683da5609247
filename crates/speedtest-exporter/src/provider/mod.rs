use crate::{
    Result,
    types::{CallerInfo, MeasurementTarget},
};
use async_trait::async_trait;
use mockall::automock;
use std::time::Duration;

pub mod speedtest;

pub use speedtest::SpeedtestProvider;

/// Boundary to the external measurement engine.
///
/// One pass calls these in order: caller info, target list, selection, then
/// per selected target the three probes. Any other provider can be swapped in
/// as long as this shape is preserved; the scheduler and collector never see
/// past it.
#[automock]
#[async_trait]
pub trait MeasurementProvider: Send + Sync {
    /// Discovers the caller's approximate location.
    async fn fetch_caller_info(&self) -> Result<CallerInfo>;

    /// Discovers candidate targets near the caller.
    async fn fetch_targets(&self, caller: &CallerInfo) -> Result<Vec<MeasurementTarget>>;

    /// Shortlists targets. An empty filter means default selection; a
    /// non-empty filter that matches nothing is a selection failure.
    fn select_targets(
        &self,
        targets: Vec<MeasurementTarget>,
        filter: &[String],
    ) -> Result<Vec<MeasurementTarget>>;

    async fn probe_latency(
        &self,
        target: &MeasurementTarget,
        saving_mode: bool,
    ) -> Result<Duration>;

    /// Measures download throughput in Mbit/s.
    async fn probe_download(&self, target: &MeasurementTarget, saving_mode: bool) -> Result<f64>;

    /// Measures upload throughput in Mbit/s.
    async fn probe_upload(&self, target: &MeasurementTarget, saving_mode: bool) -> Result<f64>;
}
