use crate::Result;
use prometheus::{Gauge, Opts};

/// Constant `1` gauge carrying the exporter name and version as labels.
pub fn build_info_gauge() -> Result<Gauge> {
    let opts = Opts::new("speedtest_exporter_info", "Info about this speedtest exporter")
        .const_label("app_name", env!("CARGO_PKG_NAME"))
        .const_label("app_version", env!("CARGO_PKG_VERSION"));
    let gauge = Gauge::with_opts(opts)?;
    gauge.set(1.0);
    Ok(gauge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{Encoder, Registry, TextEncoder};

    #[test]
    fn info_gauge_is_one_with_const_labels() {
        let registry = Registry::new();
        registry
            .register(Box::new(build_info_gauge().unwrap()))
            .unwrap();

        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buf)
            .unwrap();
        let body = String::from_utf8(buf).unwrap();

        assert!(body.contains("speedtest_exporter_info{"), "{body}");
        assert!(body.contains(r#"app_name="speedtest-exporter""#), "{body}");
        assert!(body.contains("} 1"), "{body}");
    }
}
