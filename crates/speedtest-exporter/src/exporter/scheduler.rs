use crate::{
    Result,
    exporter::{ExporterMetrics, MeasurementRunner, ResultStore},
};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::oneshot,
    time::{MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Drives periodic measurement passes and owns all writes to the store.
///
/// One pass runs immediately on entry, then one per interval until the
/// `stop` token is cancelled. A failed pass clears the store so stale or
/// partial data is never served, and is never fatal: the next tick is the
/// retry. On exit the loop fires its completion signal exactly once; the
/// sender is consumed by value, so signalling twice does not compile.
pub struct Scheduler {
    runner: MeasurementRunner,
    store: Arc<ResultStore>,
    metrics: ExporterMetrics,
    interval: Duration,
    done: Option<oneshot::Sender<()>>,
}

impl Scheduler {
    pub fn new(
        runner: MeasurementRunner,
        store: Arc<ResultStore>,
        metrics: ExporterMetrics,
        interval: Duration,
    ) -> (Self, oneshot::Receiver<()>) {
        let (done_tx, done_rx) = oneshot::channel();
        (
            Self {
                runner,
                store,
                metrics,
                interval,
                done: Some(done_tx),
            },
            done_rx,
        )
    }

    /// Runs until `stop` is cancelled. `abort` is threaded into the runner
    /// and cuts an in-flight pass short; with graceful shutdown it stays
    /// uncancelled and an in-flight pass runs to completion while `stop`
    /// only prevents new ticks.
    pub async fn run(mut self, stop: CancellationToken, abort: CancellationToken) -> Result {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval = ?self.interval, "measurement loop started");

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => {
                    info!("measurement loop stopping");
                    break;
                }
                // First tick fires immediately: the pass on entry.
                _ = ticker.tick() => self.run_once(&abort).await,
            }
        }

        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }

        Ok(())
    }

    async fn run_once(&self, abort: &CancellationToken) {
        match self.runner.run_pass(abort).await {
            Ok(results) => {
                info!(targets = results.len(), "measurement pass complete");
                self.store.set(results);
                self.metrics.runs.inc();
            }
            Err(err) => {
                error!(
                    phase = err.phase(),
                    ?err,
                    "measurement pass failed; serving empty results until the next tick"
                );
                self.store.clear();
                self.metrics.run_errors.inc();
            }
        }
    }
}
