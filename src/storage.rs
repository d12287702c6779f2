use crate::error::Result;
use crate::types::{ClientInfo, MeasurementResult, ServerInfo, StoredMeasurement};
use log::debug;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::SqliteConnection;
use std::str::FromStr;

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS server (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        server_id TEXT NOT NULL,
        url TEXT NOT NULL,
        lat REAL NOT NULL,
        lon REAL NOT NULL,
        name TEXT NOT NULL,
        country TEXT NOT NULL,
        cc TEXT NOT NULL,
        sponsor TEXT NOT NULL,
        host TEXT NOT NULL,
        d REAL NOT NULL,
        latency REAL NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS client (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ip TEXT NOT NULL,
        lat REAL NOT NULL,
        lon REAL NOT NULL,
        isp TEXT NOT NULL,
        isprating REAL NOT NULL,
        rating INTEGER NOT NULL,
        ispdlavg INTEGER NOT NULL,
        ispulavg INTEGER NOT NULL,
        loggedin INTEGER NOT NULL,
        country TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS measure_stat (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        server_id INTEGER NOT NULL REFERENCES server(id),
        client_id INTEGER NOT NULL REFERENCES client(id),
        added_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        download REAL NOT NULL,
        upload REAL NOT NULL,
        ping REAL NOT NULL,
        timestamp TEXT NOT NULL,
        bytes_sent INTEGER NOT NULL,
        bytes_received INTEGER NOT NULL,
        share TEXT
    )"#,
];

/// SQLite-backed record of every speed test that was run.
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open the database behind `url`, creating the file if it does not exist yet.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Create all tables. Existing tables and their rows are left alone.
    pub async fn initialize(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub async fn insert_server(&self, server: &ServerInfo) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let id = insert_server(&mut *tx, server).await?;
        tx.commit().await?;
        Ok(id)
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub async fn insert_client(&self, client: &ClientInfo) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let id = insert_client(&mut *tx, client).await?;
        tx.commit().await?;
        Ok(id)
    }

    /// Fails with a foreign key violation if either id is unknown.
    #[cfg_attr(not(test), allow(dead_code))]
    pub async fn insert_measurement(
        &self,
        result: &MeasurementResult,
        server_id: i64,
        client_id: i64,
    ) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let id = insert_measurement(&mut *tx, result, server_id, client_id).await?;
        tx.commit().await?;
        Ok(id)
    }

    /// Store one test run as a unit: server, client and measurement rows are
    /// committed together or not at all.
    pub async fn record(&self, result: &MeasurementResult) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let server_id = insert_server(&mut *tx, &result.server).await?;
        let client_id = insert_client(&mut *tx, &result.client).await?;
        let id = insert_measurement(&mut *tx, result, server_id, client_id).await?;
        tx.commit().await?;
        debug!("Committed measurement {} (server {}, client {})", id, server_id, client_id);
        Ok(id)
    }

    pub async fn list_measurements(&self) -> Result<Vec<StoredMeasurement>> {
        let rows = sqlx::query_as::<_, StoredMeasurement>(
            "SELECT id, server_id, client_id, added_at, download, upload, ping, \
             timestamp, bytes_sent, bytes_received, share \
             FROM measure_stat ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    #[cfg(test)]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn insert_server(conn: &mut SqliteConnection, server: &ServerInfo) -> Result<i64> {
    let done = sqlx::query(
        "INSERT INTO server (server_id, url, lat, lon, name, country, cc, sponsor, host, d, latency) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&server.server_id)
    .bind(&server.url)
    .bind(server.lat)
    .bind(server.lon)
    .bind(&server.name)
    .bind(&server.country)
    .bind(&server.cc)
    .bind(&server.sponsor)
    .bind(&server.host)
    .bind(server.d)
    .bind(server.latency)
    .execute(conn)
    .await?;
    Ok(done.last_insert_rowid())
}

async fn insert_client(conn: &mut SqliteConnection, client: &ClientInfo) -> Result<i64> {
    let done = sqlx::query(
        "INSERT INTO client (ip, lat, lon, isp, isprating, rating, ispdlavg, ispulavg, loggedin, country) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&client.ip)
    .bind(client.lat)
    .bind(client.lon)
    .bind(&client.isp)
    .bind(client.isprating)
    .bind(client.rating)
    .bind(client.ispdlavg)
    .bind(client.ispulavg)
    .bind(client.loggedin)
    .bind(&client.country)
    .execute(conn)
    .await?;
    Ok(done.last_insert_rowid())
}

async fn insert_measurement(
    conn: &mut SqliteConnection,
    result: &MeasurementResult,
    server_id: i64,
    client_id: i64,
) -> Result<i64> {
    let done = sqlx::query(
        "INSERT INTO measure_stat \
         (server_id, client_id, download, upload, ping, timestamp, bytes_sent, bytes_received, share) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(server_id)
    .bind(client_id)
    .bind(result.download)
    .bind(result.upload)
    .bind(result.ping)
    .bind(&result.timestamp)
    .bind(result.bytes_sent)
    .bind(result.bytes_received)
    .bind(&result.share)
    .execute(conn)
    .await?;
    Ok(done.last_insert_rowid())
}
