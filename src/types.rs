use chrono::{DateTime, Utc};

/// 测速服务器描述
#[derive(Debug, Clone, Default, PartialEq, sqlx::FromRow)]
pub struct ServerInfo {
    pub server_id: String, // 外部 ID, 例如 Cloudflare 的机房代码 "AMS"
    pub url: String,
    pub lat: f64,
    pub lon: f64,
    pub name: String,
    pub country: String,
    pub cc: String,
    pub sponsor: String,
    pub host: String,
    pub d: f64,       // 与客户端的距离 (km)
    pub latency: f64, // 延迟 (ms)
}

/// 客户端网络描述
#[derive(Debug, Clone, Default, PartialEq, sqlx::FromRow)]
pub struct ClientInfo {
    pub ip: String,
    pub lat: f64,
    pub lon: f64,
    pub isp: String,
    pub isprating: f64,
    pub rating: i64,
    pub ispdlavg: i64,
    pub ispulavg: i64,
    pub loggedin: bool,
    pub country: String,
}

/// One complete speed test, as produced by a result source.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementResult {
    pub server: ServerInfo,
    pub client: ClientInfo,
    pub download: f64, // bits/s
    pub upload: f64,   // bits/s
    pub ping: f64,     // ms
    pub timestamp: String,
    pub bytes_sent: i64,
    pub bytes_received: i64,
    pub share: Option<String>,
}

/// A row of `measure_stat` as read back for reporting.
#[cfg_attr(not(test), allow(dead_code))]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredMeasurement {
    pub id: i64,
    pub server_id: i64,
    pub client_id: i64,
    pub added_at: DateTime<Utc>,
    pub download: f64,
    pub upload: f64,
    pub ping: f64,
    pub timestamp: String,
    pub bytes_sent: i64,
    pub bytes_received: i64,
    pub share: Option<String>,
}
