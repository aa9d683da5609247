//! End-to-end exposition test: a mocked measurement engine feeds one pass
//! through the runner and store, and the scrape output is checked verbatim.

use prometheus::{Encoder, Registry, TextEncoder};
use speedtest_exporter::{
    exporter::{
        ExporterMetrics, MeasurementRunner, ResultStore, Scheduler, SpeedtestCollector,
        bandwidth::BandwidthObserver,
        build_info,
    },
    provider::MockMeasurementProvider,
    types::{CallerInfo, MeasurementTarget},
};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

fn caller() -> CallerInfo {
    CallerInfo {
        ip: "203.0.113.7".to_string(),
        isp: "Example ISP".to_string(),
        lat: 40.0,
        lon: -74.0,
    }
}

fn target() -> MeasurementTarget {
    MeasurementTarget {
        id: "1".to_string(),
        url: "http://host1.example.net/speedtest/upload.php".to_string(),
        name: "Anytown".to_string(),
        country: "United States".to_string(),
        sponsor: "Dat Sponsor Doh".to_string(),
        lat: "1.0".to_string(),
        lon: "-1.0".to_string(),
        distance_km: 5.0,
    }
}

fn mock_single_pass() -> MockMeasurementProvider {
    let mut mock = MockMeasurementProvider::new();
    mock.expect_fetch_caller_info().returning(|| Ok(caller()));
    mock.expect_fetch_targets().returning(|_| Ok(vec![target()]));
    mock.expect_select_targets()
        .returning(|targets, _| Ok(targets));
    mock.expect_probe_latency()
        .returning(|_, _| Ok(Duration::from_millis(4)));
    mock.expect_probe_download().returning(|_, _| Ok(716.78));
    mock.expect_probe_upload().returning(|_, _| Ok(724.49));
    mock
}

fn render(registry: &Registry) -> String {
    let mut buf = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buf)
        .unwrap();
    String::from_utf8(buf).unwrap()
}

#[tokio::test]
async fn scrape_after_one_pass_exposes_labelled_series() {
    let metrics = ExporterMetrics::new().unwrap();
    let store = Arc::new(ResultStore::new());
    let runner = MeasurementRunner::new(
        Arc::new(mock_single_pass()),
        metrics.clone(),
        Duration::from_secs(5),
        false,
        Vec::new(),
    );

    let results = runner.run_pass(&CancellationToken::new()).await.unwrap();
    store.set(results);
    metrics.runs.inc();

    let registry = Registry::new();
    registry
        .register(Box::new(
            SpeedtestCollector::new(store, metrics).unwrap(),
        ))
        .unwrap();

    let body = render(&registry);
    let series = |family: &str| -> String {
        let lines: Vec<&str> = body
            .lines()
            .filter(|l| l.starts_with(family) && l.contains('{'))
            .collect();
        assert_eq!(lines.len(), 1, "{family}: {body}");
        lines[0].to_string()
    };

    let latency = series("speedtest_latency_ms");
    for label in [
        r#"server_id="1""#,
        r#"url="http://host1.example.net/speedtest/upload.php""#,
        r#"name="Anytown""#,
        r#"country="United States""#,
        r#"sponsor="Dat Sponsor Doh""#,
        r#"lat="1.0""#,
        r#"lon="-1.0""#,
        r#"distance="5.000000""#,
    ] {
        assert!(latency.contains(label), "{latency}");
    }
    assert!(latency.ends_with(" 4"), "{latency}");
    assert!(
        series("speedtest_download_speed_mbps").ends_with(" 716.78"),
        "{body}"
    );
    assert!(
        series("speedtest_upload_speed_mbps").ends_with(" 724.49"),
        "{body}"
    );
    assert!(body.contains("speedtest_runs_total 1"), "{body}");
    assert!(body.contains("speedtest_run_errors_total 0"), "{body}");
}

#[tokio::test]
async fn scrape_after_failed_pass_drops_target_series_but_keeps_counters() {
    let mut mock = MockMeasurementProvider::new();
    mock.expect_fetch_caller_info().returning(|| Ok(caller()));
    mock.expect_fetch_targets().returning(|_| Ok(vec![target()]));
    mock.expect_select_targets()
        .returning(|targets, _| Ok(targets));
    mock.expect_probe_latency()
        .returning(|_, _| Err(speedtest_exporter::Error::Selection));

    let metrics = ExporterMetrics::new().unwrap();
    let store = Arc::new(ResultStore::new());
    // Pretend a previous pass left data behind.
    store.set(vec![speedtest_exporter::types::MeasurementResult {
        target: target(),
        latency: Duration::from_millis(4),
        download_mbps: 716.78,
        upload_mbps: 724.49,
    }]);

    let runner = MeasurementRunner::new(
        Arc::new(mock),
        metrics.clone(),
        Duration::from_secs(5),
        false,
        Vec::new(),
    );
    let (scheduler, done) = Scheduler::new(
        runner,
        store.clone(),
        metrics.clone(),
        Duration::from_secs(3600),
    );
    let stop = CancellationToken::new();
    let handle = tokio::spawn(scheduler.run(stop.clone(), CancellationToken::new()));
    tokio::time::sleep(Duration::from_millis(50)).await;
    stop.cancel();
    done.await.unwrap();
    handle.await.unwrap().unwrap();

    let registry = Registry::new();
    registry
        .register(Box::new(
            SpeedtestCollector::new(store, metrics).unwrap(),
        ))
        .unwrap();

    let body = render(&registry);
    assert!(!body.contains("speedtest_latency_ms{"), "{body}");
    assert!(body.contains("speedtest_run_errors_total 1"), "{body}");
    assert!(body.contains("speedtest_runs_total 0"), "{body}");
}

#[test]
fn scrape_includes_build_info_and_bandwidth_counters() {
    let registry = Registry::new();
    let observer = BandwidthObserver::new().unwrap();
    observer.record_download(Some(1024));
    observer.record_upload(None);
    registry.register(Box::new(observer)).unwrap();
    registry
        .register(Box::new(build_info::build_info_gauge().unwrap()))
        .unwrap();

    let body = render(&registry);
    assert!(
        body.contains(&format!(
            "speedtest_exporter_info{{app_name=\"speedtest-exporter\",app_version=\"{}\"}} 1",
            env!("CARGO_PKG_VERSION")
        )),
        "{body}"
    );
    assert!(body.contains("speedtest_bytes_downloaded_total 1024"), "{body}");
    assert!(body.contains("speedtest_unknown_content_size_total 1"), "{body}");
}
