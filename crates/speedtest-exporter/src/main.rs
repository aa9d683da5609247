use clap::Parser;
use prometheus::Registry;
use speedtest_exporter::{
    exporter::{
        ExporterMetrics, MeasurementRunner, ResultStore, Scheduler, SpeedtestCollector,
        bandwidth::{BandwidthObserver, TrackedClient},
        build_info,
    },
    provider::SpeedtestProvider,
    server,
    settings::Settings,
};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "speedtest-exporter", about = "Prometheus exporter for periodic bandwidth measurements")]
struct AppArgs {
    /// Configuration environment name (loads config/<env>.toml over defaults)
    #[arg(long, default_value = "default")]
    env: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = AppArgs::parse();
    let settings = Settings::load(args.env)?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&settings.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        interval = ?settings.exporter.interval(),
        run_timeout = ?settings.exporter.run_timeout(),
        saving_mode = settings.exporter.saving_mode,
        "speedtest exporter starting"
    );

    let registry = Registry::new();

    let observer = Arc::new(BandwidthObserver::new()?);
    registry.register(Box::new(observer.as_ref().clone()))?;
    registry.register(Box::new(build_info::build_info_gauge()?))?;
    #[cfg(target_os = "linux")]
    if settings.exporter.process_metrics {
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;
    }

    let provider = Arc::new(SpeedtestProvider::new(
        TrackedClient::new(reqwest::Client::new(), observer),
        &settings.speedtest,
    ));
    let store = Arc::new(ResultStore::new());
    let metrics = ExporterMetrics::new()?;
    let collector = SpeedtestCollector::new(store.clone(), metrics.clone())?;
    registry.register(Box::new(collector))?;

    let runner = MeasurementRunner::new(
        provider,
        metrics.clone(),
        settings.exporter.run_timeout(),
        settings.exporter.saving_mode,
        settings.speedtest.filter.clone(),
    );
    let (scheduler, done) = Scheduler::new(runner, store, metrics, settings.exporter.interval());

    let stop = CancellationToken::new();
    let abort = CancellationToken::new();
    tokio::spawn(scheduler.run(stop.clone(), abort.clone()));

    let shutdown_signal = shutdown_listener();
    let graceful = settings.exporter.graceful_shutdown;
    let grace_timeout = settings.exporter.graceful_shutdown_timeout();
    let shutdown = async move {
        shutdown_signal.cancelled().await;
        info!("shutdown signal received");
        stop.cancel();
        if !graceful {
            info!("cancelling in-flight measurement pass");
            abort.cancel();
        }
        if tokio::time::timeout(grace_timeout, done).await.is_err() {
            warn!("measurement loop did not stop within the graceful shutdown timeout");
        }
    };

    // Failing to bind the scrape listener is the one fatal error here.
    let listener = tokio::net::TcpListener::bind(settings.exporter.listen_addr).await?;
    info!(addr = %settings.exporter.listen_addr, "metrics listener bound");

    axum::serve(listener, server::router(registry))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("speedtest exporter shutting down");
    Ok(())
}

fn shutdown_listener() -> CancellationToken {
    let cancellation_token = CancellationToken::new();
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("sigterm listener failed");
    tokio::spawn({
        let cancellation_token = cancellation_token.clone();
        async move {
            tokio::select! {
                _ = sigterm.recv() => cancellation_token.cancel(),
                _ = signal::ctrl_c() => cancellation_token.cancel(),
            }
        }
    });

    cancellation_token
}
