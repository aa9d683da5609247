use crate::{
    Error, Result,
    exporter::bandwidth::TrackedClient,
    provider::MeasurementProvider,
    settings::SpeedtestSettings,
    types::{CallerInfo, MeasurementTarget},
};
use async_trait::async_trait;
use rand::RngCore;
use serde::Deserialize;
use std::{
    cmp::Ordering,
    time::{Duration, Instant},
};
use tracing::debug;

const EARTH_RADIUS_KM: f64 = 6371.0;

// Payload sizing: saving mode trades accuracy for less data on the wire.
const DOWNLOAD_IMAGE_SIZE: u32 = 2000;
const SAVING_DOWNLOAD_IMAGE_SIZE: u32 = 500;
const UPLOAD_BYTES: usize = 4 << 20;
const SAVING_UPLOAD_BYTES: usize = 512 << 10;

/// Measurement engine backed by the public speedtest.net endpoints.
///
/// Caller info comes from the `<client …>` element of the config document,
/// the target list from the JSON servers API; probes are timed transfers
/// against a target's upload URL and its sibling paths. All traffic goes
/// through the bandwidth-accounting client.
pub struct SpeedtestProvider {
    client: TrackedClient,
    config_url: String,
    servers_url: String,
    max_targets: usize,
}

/// Partial response from the servers API; only the fields we label on.
#[derive(Debug, Deserialize)]
struct ServerEntry {
    id: String,
    url: String,
    name: String,
    country: String,
    sponsor: String,
    lat: String,
    lon: String,
}

impl SpeedtestProvider {
    pub fn new(client: TrackedClient, settings: &SpeedtestSettings) -> Self {
        Self {
            client,
            config_url: settings.config_url.clone(),
            servers_url: settings.servers_url.clone(),
            max_targets: settings.max_targets,
        }
    }

    fn target_from_entry(caller: &CallerInfo, entry: ServerEntry) -> MeasurementTarget {
        // Servers with unparseable coordinates sort last in default selection.
        let distance_km = match (entry.lat.parse::<f64>(), entry.lon.parse::<f64>()) {
            (Ok(lat), Ok(lon)) => haversine_km(caller.lat, caller.lon, lat, lon),
            _ => f64::INFINITY,
        };
        MeasurementTarget {
            id: entry.id,
            url: entry.url,
            name: entry.name,
            country: entry.country,
            sponsor: entry.sponsor,
            lat: entry.lat,
            lon: entry.lon,
            distance_km,
        }
    }
}

#[async_trait]
impl MeasurementProvider for SpeedtestProvider {
    async fn fetch_caller_info(&self) -> Result<CallerInfo> {
        let body = self.client.get(&self.config_url).await?.text().await?;
        let caller = parse_client_element(&body)?;
        debug!(ip = %caller.ip, isp = %caller.isp, "fetched caller info");
        Ok(caller)
    }

    async fn fetch_targets(&self, caller: &CallerInfo) -> Result<Vec<MeasurementTarget>> {
        let body = self.client.get(&self.servers_url).await?.text().await?;
        let entries: Vec<ServerEntry> = serde_json::from_str(&body)?;
        debug!(count = entries.len(), "fetched server list");
        Ok(entries
            .into_iter()
            .map(|entry| Self::target_from_entry(caller, entry))
            .collect())
    }

    fn select_targets(
        &self,
        mut targets: Vec<MeasurementTarget>,
        filter: &[String],
    ) -> Result<Vec<MeasurementTarget>> {
        if !filter.is_empty() {
            targets.retain(|t| filter.contains(&t.id));
            if targets.is_empty() {
                return Err(Error::Selection);
            }
            return Ok(targets);
        }
        targets.sort_by(|a, b| {
            a.distance_km
                .partial_cmp(&b.distance_km)
                .unwrap_or(Ordering::Equal)
        });
        targets.truncate(self.max_targets);
        Ok(targets)
    }

    async fn probe_latency(
        &self,
        target: &MeasurementTarget,
        saving_mode: bool,
    ) -> Result<Duration> {
        let url = format!("{}/latency.txt", probe_base(&target.url));
        let rounds = if saving_mode { 1 } else { 3 };
        let mut best: Option<Duration> = None;
        for _ in 0..rounds {
            let started = Instant::now();
            self.client.get(&url).await?.bytes().await?;
            let elapsed = started.elapsed();
            best = Some(best.map_or(elapsed, |b| b.min(elapsed)));
        }
        Ok(best.unwrap_or_default())
    }

    async fn probe_download(&self, target: &MeasurementTarget, saving_mode: bool) -> Result<f64> {
        let size = if saving_mode {
            SAVING_DOWNLOAD_IMAGE_SIZE
        } else {
            DOWNLOAD_IMAGE_SIZE
        };
        let url = format!("{}/random{size}x{size}.jpg", probe_base(&target.url));
        let started = Instant::now();
        let body = self.client.get(&url).await?.bytes().await?;
        Ok(mbps(body.len() as u64, started.elapsed()))
    }

    async fn probe_upload(&self, target: &MeasurementTarget, saving_mode: bool) -> Result<f64> {
        let size = if saving_mode {
            SAVING_UPLOAD_BYTES
        } else {
            UPLOAD_BYTES
        };
        let mut payload = vec![0u8; size];
        rand::thread_rng().fill_bytes(&mut payload);
        let started = Instant::now();
        self.client.post(&target.url, payload).await?.bytes().await?;
        Ok(mbps(size as u64, started.elapsed()))
    }
}

/// Extracts ip/isp/lat/lon from the `<client …>` element of the speedtest
/// config document.
fn parse_client_element(body: &str) -> Result<CallerInfo> {
    let start = body
        .find("<client ")
        .ok_or_else(|| Error::ConfigDecode("no <client> element".to_string()))?;
    let element = &body[start..];
    let end = element
        .find('>')
        .ok_or_else(|| Error::ConfigDecode("unterminated <client> element".to_string()))?;
    let element = &element[..end];

    let attr = |name: &str| -> Result<&str> {
        let needle = format!("{name}=\"");
        let at = element
            .find(&needle)
            .ok_or_else(|| Error::ConfigDecode(format!("missing client attribute {name}")))?;
        let rest = &element[at + needle.len()..];
        let close = rest
            .find('"')
            .ok_or_else(|| Error::ConfigDecode(format!("unterminated client attribute {name}")))?;
        Ok(&rest[..close])
    };

    let lat = attr("lat")?
        .parse::<f64>()
        .map_err(|err| Error::ConfigDecode(format!("bad client lat: {err}")))?;
    let lon = attr("lon")?
        .parse::<f64>()
        .map_err(|err| Error::ConfigDecode(format!("bad client lon: {err}")))?;

    Ok(CallerInfo {
        ip: attr("ip")?.to_string(),
        isp: attr("isp")?.to_string(),
        lat,
        lon,
    })
}

/// The directory a target's upload URL lives in; probe paths are siblings.
fn probe_base(url: &str) -> &str {
    url.rsplit_once('/').map(|(base, _)| base).unwrap_or(url)
}

fn mbps(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= f64::EPSILON {
        return 0.0;
    }
    (bytes as f64 * 8.0) / 1_000_000.0 / secs
}

fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}
