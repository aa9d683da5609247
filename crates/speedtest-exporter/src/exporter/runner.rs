use crate::{
    Error, Result,
    error::ProbeStage,
    exporter::ExporterMetrics,
    provider::MeasurementProvider,
    types::{MeasurementResult, MeasurementTarget, ResultSet},
};
use std::{
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Sub-timeout for each discovery fetch, distinct from the run timeout.
const DISCOVERY_TIMEOUT: Duration = Duration::from_millis(1500);

/// Executes one measurement pass against the engine boundary.
///
/// The whole probing phase shares one run timeout rather than budgeting per
/// target, so a slow early target starves later targets of their share.
/// Known limitation, acceptable for a single-pass best-effort exporter.
pub struct MeasurementRunner {
    provider: Arc<dyn MeasurementProvider>,
    metrics: ExporterMetrics,
    run_timeout: Duration,
    saving_mode: bool,
    filter: Vec<String>,
}

impl MeasurementRunner {
    pub fn new(
        provider: Arc<dyn MeasurementProvider>,
        metrics: ExporterMetrics,
        run_timeout: Duration,
        saving_mode: bool,
        filter: Vec<String>,
    ) -> Self {
        Self {
            provider,
            metrics,
            run_timeout,
            saving_mode,
            filter,
        }
    }

    /// Runs discovery, selection and the per-target probes, in that order.
    /// Any failure aborts the pass; partial results are discarded.
    pub async fn run_pass(&self, abort: &CancellationToken) -> Result<ResultSet> {
        let discovery_started = Instant::now();

        let caller = bounded(
            "caller_info",
            DISCOVERY_TIMEOUT,
            abort,
            self.provider.fetch_caller_info(),
        )
        .await
        .map_err(|err| wrap_discovery(err, Error::CallerInfo))?;
        debug!(ip = %caller.ip, "discovered caller info");

        let targets = bounded(
            "target_list",
            DISCOVERY_TIMEOUT,
            abort,
            self.provider.fetch_targets(&caller),
        )
        .await
        .map_err(|err| wrap_discovery(err, Error::TargetList))?;
        self.metrics
            .discovery_duration
            .set(discovery_started.elapsed().as_secs_f64());
        debug!(count = targets.len(), "discovered targets");

        let selected = self.provider.select_targets(targets, &self.filter)?;
        debug!(count = selected.len(), "selected targets");

        let probe_started = Instant::now();
        let outcome = bounded(
            "probe_run",
            self.run_timeout,
            abort,
            self.probe_all(&selected),
        )
        .await;
        // Last-observed probing time, recorded whether or not the phase
        // succeeded.
        self.metrics
            .run_duration
            .set(probe_started.elapsed().as_secs_f64());
        outcome
    }

    async fn probe_all(&self, targets: &[MeasurementTarget]) -> Result<ResultSet> {
        let mut results = ResultSet::with_capacity(targets.len());
        for target in targets {
            let latency = self
                .provider
                .probe_latency(target, self.saving_mode)
                .await
                .map_err(|err| Error::probe(ProbeStage::Latency, target.id.clone(), err))?;
            let download_mbps = self
                .provider
                .probe_download(target, self.saving_mode)
                .await
                .map_err(|err| Error::probe(ProbeStage::Download, target.id.clone(), err))?;
            let upload_mbps = self
                .provider
                .probe_upload(target, self.saving_mode)
                .await
                .map_err(|err| Error::probe(ProbeStage::Upload, target.id.clone(), err))?;
            debug!(server_id = %target.id, ?latency, download_mbps, upload_mbps, "probed target");
            results.push(MeasurementResult {
                target: target.clone(),
                latency,
                download_mbps,
                upload_mbps,
            });
        }
        Ok(results)
    }
}

/// Races a phase against its deadline and the hard-abort token.
async fn bounded<T>(
    phase: &'static str,
    timeout: Duration,
    abort: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = abort.cancelled() => Err(Error::Cancelled),
        res = tokio::time::timeout(timeout, fut) => match res {
            Ok(inner) => inner,
            Err(_) => Err(Error::Timeout {
                phase,
                timeout_secs: timeout.as_secs(),
            }),
        },
    }
}

/// Timeouts and cancellations already identify their phase; everything else
/// gets tagged with the discovery step it broke in.
fn wrap_discovery(err: Error, wrap: fn(Box<Error>) -> Error) -> Error {
    match err {
        err @ (Error::Timeout { .. } | Error::Cancelled) => err,
        other => wrap(Box::new(other)),
    }
}
