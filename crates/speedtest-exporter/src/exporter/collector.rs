use crate::{
    Result,
    exporter::{ExporterMetrics, ResultStore},
};
use prometheus::{
    GaugeVec, Opts,
    core::{Collector, Desc},
    proto,
};
use std::sync::{Arc, Mutex};

/// Label set shared by the three per-target metric families, in emission
/// order. Values are identical verbatim across the families for one target.
const TARGET_LABELS: [&str; 8] = [
    "server_id",
    "url",
    "name",
    "country",
    "sponsor",
    "lat",
    "lon",
    "distance",
];

/// Pull collector for measurement results. Cached-read design: a scrape
/// reads whatever the background scheduler last stored and never triggers
/// measurement I/O, so collection cost is O(results) and staleness is
/// bounded by the scheduling interval.
#[derive(Clone)]
pub struct SpeedtestCollector {
    store: Arc<ResultStore>,
    metrics: ExporterMetrics,
    latency: GaugeVec,
    download_speed: GaugeVec,
    upload_speed: GaugeVec,
    // Serializes the per-target gauge rebuild across concurrent scrapes.
    rebuild: Arc<Mutex<()>>,
}

impl SpeedtestCollector {
    pub fn new(store: Arc<ResultStore>, metrics: ExporterMetrics) -> Result<Self> {
        Ok(Self {
            store,
            metrics,
            latency: GaugeVec::new(
                Opts::new("speedtest_latency_ms", "Latency to the target in ms"),
                &TARGET_LABELS,
            )?,
            download_speed: GaugeVec::new(
                Opts::new(
                    "speedtest_download_speed_mbps",
                    "Download speed from the target in Mbit/s",
                ),
                &TARGET_LABELS,
            )?,
            upload_speed: GaugeVec::new(
                Opts::new(
                    "speedtest_upload_speed_mbps",
                    "Upload speed to the target in Mbit/s",
                ),
                &TARGET_LABELS,
            )?,
            rebuild: Arc::new(Mutex::new(())),
        })
    }
}

impl Collector for SpeedtestCollector {
    fn desc(&self) -> Vec<&Desc> {
        let mut descs = Vec::with_capacity(7);
        descs.extend(self.latency.desc());
        descs.extend(self.download_speed.desc());
        descs.extend(self.upload_speed.desc());
        descs.extend(self.metrics.run_duration.desc());
        descs.extend(self.metrics.discovery_duration.desc());
        descs.extend(self.metrics.run_errors.desc());
        descs.extend(self.metrics.runs.desc());
        descs
    }

    fn collect(&self) -> Vec<proto::MetricFamily> {
        let _guard = self
            .rebuild
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        self.latency.reset();
        self.download_speed.reset();
        self.upload_speed.reset();

        for result in self.store.get() {
            let target = &result.target;
            let distance = target.distance_label();
            let labels = [
                target.id.as_str(),
                target.url.as_str(),
                target.name.as_str(),
                target.country.as_str(),
                target.sponsor.as_str(),
                target.lat.as_str(),
                target.lon.as_str(),
                distance.as_str(),
            ];
            self.latency
                .with_label_values(&labels)
                .set(result.latency_ms());
            self.download_speed
                .with_label_values(&labels)
                .set(result.download_mbps);
            self.upload_speed
                .with_label_values(&labels)
                .set(result.upload_mbps);
        }

        let mut mfs = Vec::with_capacity(7);
        mfs.extend(self.metrics.run_duration.collect());
        mfs.extend(self.metrics.discovery_duration.collect());
        mfs.extend(self.metrics.run_errors.collect());
        mfs.extend(self.metrics.runs.collect());
        mfs.extend(self.latency.collect());
        mfs.extend(self.download_speed.collect());
        mfs.extend(self.upload_speed.collect());
        mfs
    }
}
