use crate::Result;
use prometheus::{
    IntCounter, Opts,
    core::{Collector, Desc},
    proto,
};
use std::sync::Arc;
use tracing::debug;

/// Counts the bytes the measurement engine itself transfers.
///
/// Sizes come from the declared content lengths, not the bodies actually
/// read; a request side whose length cannot be determined increments the
/// unknown-size counter once for that side.
#[derive(Clone)]
pub struct BandwidthObserver {
    bytes_uploaded: IntCounter,
    bytes_downloaded: IntCounter,
    unknown_content_size: IntCounter,
}

impl BandwidthObserver {
    pub fn new() -> Result<Self> {
        Ok(Self {
            bytes_uploaded: IntCounter::with_opts(Opts::new(
                "speedtest_bytes_uploaded_total",
                "Total bytes uploaded by measurement traffic",
            ))?,
            bytes_downloaded: IntCounter::with_opts(Opts::new(
                "speedtest_bytes_downloaded_total",
                "Total bytes downloaded by measurement traffic",
            ))?,
            unknown_content_size: IntCounter::with_opts(Opts::new(
                "speedtest_unknown_content_size_total",
                "Number of request sides whose content size could not be determined",
            ))?,
        })
    }

    /// Records the upload side of a request that carried a body.
    pub fn record_upload(&self, content_length: Option<u64>) {
        match content_length {
            Some(len) if len > 0 => self.bytes_uploaded.inc_by(len),
            _ => {
                debug!("unknown request content size");
                self.unknown_content_size.inc();
            }
        }
    }

    /// Records the download side of a response.
    pub fn record_download(&self, content_length: Option<u64>) {
        match content_length {
            Some(len) if len > 0 => self.bytes_downloaded.inc_by(len),
            _ => {
                debug!("unknown response content size");
                self.unknown_content_size.inc();
            }
        }
    }
}

impl Collector for BandwidthObserver {
    fn desc(&self) -> Vec<&Desc> {
        let mut descs = Vec::with_capacity(3);
        descs.extend(self.bytes_uploaded.desc());
        descs.extend(self.bytes_downloaded.desc());
        descs.extend(self.unknown_content_size.desc());
        descs
    }

    fn collect(&self) -> Vec<proto::MetricFamily> {
        let mut mfs = Vec::with_capacity(3);
        mfs.extend(self.bytes_uploaded.collect());
        mfs.extend(self.bytes_downloaded.collect());
        mfs.extend(self.unknown_content_size.collect());
        mfs
    }
}

/// HTTP client the provider performs all measurement traffic through, so
/// every request is accounted by the [`BandwidthObserver`].
#[derive(Clone)]
pub struct TrackedClient {
    client: reqwest::Client,
    observer: Arc<BandwidthObserver>,
}

impl TrackedClient {
    pub fn new(client: reqwest::Client, observer: Arc<BandwidthObserver>) -> Self {
        Self { client, observer }
    }

    /// GET with the download side observed from the response header. The
    /// request carries no body, so no upload-side record is made.
    pub async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let resp = self.client.get(url).send().await?.error_for_status()?;
        self.observer.record_download(resp.content_length());
        Ok(resp)
    }

    /// POST with both sides observed.
    pub async fn post(&self, url: &str, body: Vec<u8>) -> Result<reqwest::Response> {
        let body_len = body.len() as u64;
        let resp = self
            .client
            .post(url)
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        self.observer.record_upload(Some(body_len));
        self.observer.record_download(resp.content_length());
        Ok(resp)
    }
}
