use crate::config::SpeedtestSettings;
use crate::error::{Result, SpeedError};
use crate::traits::ResultSource;
use crate::types::{ClientInfo, MeasurementResult, ServerInfo};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use reqwest::{Client, Url};
use serde::{Deserialize, Deserializer};
use std::time::{Duration, Instant};

const BASE_URL: &str = "https://speed.cloudflare.com";
const DEFAULT_THREADS: usize = 4;
const CONNECT_TIMEOUT: u64 = 10;
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Speed test against Cloudflare's public speed endpoints.
pub struct CloudflareSource {
    client: Client,
    base_url: Url,
    threads: usize,
    ping_count: usize,
    download_bytes: u64,
    upload_bytes: u64,
}

impl CloudflareSource {
    pub fn new(settings: &SpeedtestSettings) -> Result<Self> {
        Self::with_base_url(settings, BASE_URL)
    }

    pub fn with_base_url(settings: &SpeedtestSettings, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| SpeedError::Config(format!("invalid speed test url {}: {}", base_url, e)))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT))
            .user_agent(concat!("speed-logger/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url,
            threads: settings.threads.unwrap_or(DEFAULT_THREADS),
            ping_count: settings.ping_count,
            download_bytes: settings.download_bytes,
            upload_bytes: settings.upload_bytes,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    async fn fetch_meta(&self) -> Result<Meta> {
        let body = self
            .client
            .get(self.endpoint("meta"))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// 根据 meta 中的机房信息确定服务器位置; 只有代码时再查 /locations
    async fn resolve_colo(&self, colo: Option<Colo>) -> Result<Location> {
        match colo {
            Some(Colo::Detail(location)) => Ok(location),
            Some(Colo::Code(code)) => {
                let body = self
                    .client
                    .get(self.endpoint("locations"))
                    .send()
                    .await?
                    .error_for_status()?
                    .text()
                    .await?;
                let locations: Vec<Location> = serde_json::from_str(&body)?;
                find_location(locations, &code)
            }
            None => Err(SpeedError::Measurement(
                "no test server reported by speed.cloudflare.com".to_string(),
            )),
        }
    }

    async fn measure_latency(&self) -> Result<f64> {
        let url = self.endpoint("__down?bytes=0");
        let mut samples = Vec::with_capacity(self.ping_count);

        for _ in 0..self.ping_count {
            let start = Instant::now();
            match self.client.get(&url).send().await.and_then(|r| r.error_for_status()) {
                Ok(_) => samples.push(start.elapsed().as_secs_f64() * 1000.0),
                Err(e) => warn!("Latency probe failed: {}", e),
            }
        }

        if samples.is_empty() {
            return Err(SpeedError::Measurement("server did not answer any latency probe".to_string()));
        }
        Ok(samples.iter().sum::<f64>() / samples.len() as f64)
    }

    /// 并发下载, 返回 (总字节数, 耗时)
    async fn measure_download(&self) -> Result<(u64, Duration)> {
        let per_stream = (self.download_bytes / self.threads as u64).max(1);
        let url = self.endpoint(&format!("__down?bytes={}", per_stream));

        let start = Instant::now();
        let tasks = (0..self.threads).map(|_| download_stream(&self.client, &url));
        let results = futures::future::join_all(tasks).await;
        let elapsed = start.elapsed();

        let mut total = 0;
        for bytes in results {
            total += bytes?;
        }
        Ok((total, elapsed))
    }

    async fn measure_upload(&self) -> Result<(u64, Duration)> {
        let per_stream = (self.upload_bytes / self.threads as u64).max(1) as usize;
        let url = self.endpoint("__up");
        let payload = vec![0u8; per_stream];

        let start = Instant::now();
        let tasks = (0..self.threads).map(|_| upload_stream(&self.client, &url, payload.clone()));
        let results = futures::future::join_all(tasks).await;
        let elapsed = start.elapsed();

        let mut total = 0;
        for bytes in results {
            total += bytes?;
        }
        Ok((total, elapsed))
    }
}

#[async_trait]
impl ResultSource for CloudflareSource {
    fn name(&self) -> &'static str {
        "cloudflare"
    }

    async fn run(&self) -> Result<MeasurementResult> {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(120));

        let outcome = self.run_phases(&pb).await;
        match &outcome {
            Ok(_) => pb.finish_with_message("Speed test completed."),
            Err(_) => pb.abandon_with_message("Speed test failed."),
        }
        outcome
    }
}

impl CloudflareSource {
    async fn run_phases(&self, pb: &ProgressBar) -> Result<MeasurementResult> {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        debug!("Get client and server information");
        pb.set_message("Looking up server...");
        let meta = self.fetch_meta().await?;
        let location = self.resolve_colo(meta.colo.clone()).await?;
        debug!("Using server {} ({})", location.iata, location.city);

        pb.set_message(format!("Testing latency to {}...", location.iata));
        let ping = self.measure_latency().await?;

        info!("Test download speed");
        pb.set_message("Testing download speed...");
        let (bytes_received, down_elapsed) = self.measure_download().await?;
        let download = bits_per_sec(bytes_received, down_elapsed)?;

        info!("Test upload speed");
        pb.set_message("Testing upload speed...");
        let (bytes_sent, up_elapsed) = self.measure_upload().await?;
        let upload = bits_per_sec(bytes_sent, up_elapsed)?;

        let server = ServerInfo {
            server_id: location.iata.clone(),
            url: self.endpoint("__down"),
            lat: location.lat,
            lon: location.lon,
            name: location.city.clone(),
            country: location.region.clone(),
            cc: location.cca2.clone(),
            sponsor: "Cloudflare".to_string(),
            host: self.base_url.host_str().unwrap_or_default().to_string(),
            d: haversine_km(meta.latitude, meta.longitude, location.lat, location.lon),
            latency: ping,
        };

        let client = ClientInfo {
            ip: meta.client_ip,
            lat: meta.latitude,
            lon: meta.longitude,
            isp: meta.as_organization,
            country: meta.country,
            ..Default::default()
        };

        Ok(MeasurementResult {
            server,
            client,
            download,
            upload,
            ping,
            timestamp,
            bytes_sent: bytes_sent as i64,
            bytes_received: bytes_received as i64,
            share: None,
        })
    }
}

async fn download_stream(client: &Client, url: &str) -> Result<u64> {
    let response = client.get(url).send().await?.error_for_status()?;
    let mut stream = response.bytes_stream();
    let mut received = 0u64;
    while let Some(chunk) = stream.next().await {
        received += chunk?.len() as u64;
    }
    Ok(received)
}

async fn upload_stream(client: &Client, url: &str, payload: Vec<u8>) -> Result<u64> {
    let len = payload.len() as u64;
    client.post(url).body(payload).send().await?.error_for_status()?;
    Ok(len)
}

fn bits_per_sec(bytes: u64, elapsed: Duration) -> Result<f64> {
    let secs = elapsed.as_secs_f64();
    if bytes == 0 || secs <= 0.0 {
        return Err(SpeedError::Measurement("no data was transferred".to_string()));
    }
    Ok(bytes as f64 * 8.0 / secs)
}

/// Great-circle distance in km.
fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// Without coordinates the server row would carry a made-up distance, so an
/// unlisted colo fails the run.
fn find_location(locations: Vec<Location>, code: &str) -> Result<Location> {
    locations
        .into_iter()
        .find(|l| l.iata.eq_ignore_ascii_case(code))
        .ok_or_else(|| SpeedError::Measurement(format!("unknown test server location: {}", code)))
}

// --- /meta and /locations payloads ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Meta {
    #[serde(default)]
    client_ip: String,
    #[serde(default)]
    as_organization: String,
    #[serde(default)]
    country: String,
    #[serde(default, deserialize_with = "lossy_f64")]
    latitude: f64,
    #[serde(default, deserialize_with = "lossy_f64")]
    longitude: f64,
    #[serde(default)]
    colo: Option<Colo>,
}

/// `colo` is either a bare IATA code or a full location object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Colo {
    Code(String),
    Detail(Location),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Location {
    iata: String,
    #[serde(default, deserialize_with = "lossy_f64")]
    lat: f64,
    #[serde(default, deserialize_with = "lossy_f64")]
    lon: f64,
    #[serde(default)]
    cca2: String,
    #[serde(default)]
    region: String,
    #[serde(default)]
    city: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(f64),
    Text(String),
}

/// Coordinates come back as numbers or as strings depending on the endpoint.
fn lossy_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<NumberOrText>::deserialize(deserializer)? {
        Some(NumberOrText::Number(n)) => n,
        Some(NumberOrText::Text(s)) => s.trim().parse().unwrap_or(0.0),
        None => 0.0,
    })
}
