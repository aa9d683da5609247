use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Approximate location of the caller, discovered at the start of a pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerInfo {
    pub ip: String,
    pub isp: String,
    pub lat: f64,
    pub lon: f64,
}

/// One candidate remote endpoint, immutable once discovered within a pass.
///
/// `lat`/`lon` stay decimal strings: they are emitted verbatim as label
/// values. `distance_km` is computed from the caller's coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementTarget {
    pub id: String,
    pub url: String,
    pub name: String,
    pub country: String,
    pub sponsor: String,
    pub lat: String,
    pub lon: String,
    pub distance_km: f64,
}

impl MeasurementTarget {
    /// Distance rendered the way it appears in label values.
    pub fn distance_label(&self) -> String {
        format!("{:.6}", self.distance_km)
    }
}

/// Per-target outcome of one pass: the target enriched with the three
/// measured values.
#[derive(Debug, Clone)]
pub struct MeasurementResult {
    pub target: MeasurementTarget,
    pub latency: Duration,
    pub download_mbps: f64,
    pub upload_mbps: f64,
}

impl MeasurementResult {
    pub fn latency_ms(&self) -> f64 {
        self.latency.as_secs_f64() * 1_000.0
    }
}

/// Ordered output of one pass, one entry per probed target. May be empty.
pub type ResultSet = Vec<MeasurementResult>;

#[cfg(test)]
pub(crate) fn test_target() -> MeasurementTarget {
    MeasurementTarget {
        id: "1".to_string(),
        url: "http://speedtest.example.net:8080/speedtest/upload.php".to_string(),
        name: "Anytown, USA".to_string(),
        country: "United States".to_string(),
        sponsor: "Dat Sponsor Doh".to_string(),
        lat: "1.0".to_string(),
        lon: "-1.0".to_string(),
        distance_km: 5.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_label_is_fixed_precision() {
        let target = test_target();
        assert_eq!(target.distance_label(), "5.000000");
    }

    #[test]
    fn latency_converts_to_millis() {
        let result = MeasurementResult {
            target: test_target(),
            latency: Duration::from_micros(4_130),
            download_mbps: 716.78,
            upload_mbps: 724.49,
        };
        assert!((result.latency_ms() - 4.13).abs() < 1e-9);
    }
}
