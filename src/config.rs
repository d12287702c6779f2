use crate::error::{Result, SpeedError};
use directories::ProjectDirs;
use log::LevelFilter;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.toml";

/// Settings loaded once at startup and handed to every command handler.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub settings: LogSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub speedtest: SpeedtestSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogSettings {
    /// Python-style numeric severity: 10 DEBUG, 20 INFO, 30 WARNING, 40 ERROR, 50 CRITICAL
    #[serde(default = "default_log_level")]
    pub log_level: u32,
    pub log_filename: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseSettings {
    #[serde(default = "default_database_url")]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpeedtestSettings {
    #[serde(default = "default_source")]
    pub source: String,
    /// Parallel streams; None lets the source pick.
    pub threads: Option<usize>,
    #[serde(default = "default_ping_count")]
    pub ping_count: usize,
    #[serde(default = "default_download_bytes")]
    pub download_bytes: u64,
    #[serde(default = "default_upload_bytes")]
    pub upload_bytes: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_log_level() -> u32 {
    20
}

fn default_database_url() -> String {
    "sqlite://speed-logger.db".to_string()
}

fn default_source() -> String {
    "cloudflare".to_string()
}

fn default_ping_count() -> usize {
    10
}

fn default_download_bytes() -> u64 {
    25_000_000
}

fn default_upload_bytes() -> u64 {
    10_000_000
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_filename: None,
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

impl Default for SpeedtestSettings {
    fn default() -> Self {
        Self {
            source: default_source(),
            threads: None,
            ping_count: default_ping_count(),
            download_bytes: default_download_bytes(),
            upload_bytes: default_upload_bytes(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LogSettings {
    pub fn level_filter(&self) -> LevelFilter {
        match self.log_level {
            0 => LevelFilter::Trace,
            1..=10 => LevelFilter::Debug,
            11..=20 => LevelFilter::Info,
            21..=30 => LevelFilter::Warn,
            _ => LevelFilter::Error,
        }
    }
}

impl Settings {
    /// Locate and load the settings file
    /// Strategy:
    /// 1. ./config.toml in the working directory
    /// 2. User config (~/.config/speed-logger/config.toml)
    /// 3. Built-in defaults
    pub fn load() -> Result<Self> {
        match Self::locate() {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    fn locate() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }

        ProjectDirs::from("", "", "speed-logger")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
            .filter(|path| path.exists())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        let speedtest = &self.speedtest;
        if speedtest.threads == Some(0) {
            return Err(SpeedError::Config(
                "speedtest.threads must be a positive integer".to_string(),
            ));
        }
        if speedtest.ping_count == 0 {
            return Err(SpeedError::Config(
                "speedtest.ping_count must be at least 1".to_string(),
            ));
        }
        if speedtest.download_bytes == 0 || speedtest.upload_bytes == 0 {
            return Err(SpeedError::Config(
                "speedtest payload sizes must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_when_empty() -> Result<()> {
        let settings = Settings::parse("")?;
        assert_eq!(settings.settings.log_level, 20);
        assert!(settings.settings.log_filename.is_none());
        assert_eq!(settings.database.url, "sqlite://speed-logger.db");
        assert_eq!(settings.speedtest.source, "cloudflare");
        assert!(settings.speedtest.threads.is_none());
        Ok(())
    }

    #[test]
    fn test_from_file() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[settings]
log_level = 10
log_filename = "speed.log"

[database]
url = "sqlite://results.db"

[speedtest]
threads = 1
ping_count = 3
"#,
        )?;

        let settings = Settings::from_file(&path)?;
        assert_eq!(settings.settings.level_filter(), LevelFilter::Debug);
        assert_eq!(settings.settings.log_filename, Some(PathBuf::from("speed.log")));
        assert_eq!(settings.database.url, "sqlite://results.db");
        assert_eq!(settings.speedtest.threads, Some(1));
        assert_eq!(settings.speedtest.ping_count, 3);
        assert_eq!(settings.speedtest.download_bytes, 25_000_000);
        Ok(())
    }

    #[test]
    fn test_level_mapping() {
        let level = |log_level| LogSettings { log_level, log_filename: None }.level_filter();
        assert_eq!(level(0), LevelFilter::Trace);
        assert_eq!(level(10), LevelFilter::Debug);
        assert_eq!(level(20), LevelFilter::Info);
        assert_eq!(level(30), LevelFilter::Warn);
        assert_eq!(level(40), LevelFilter::Error);
        assert_eq!(level(50), LevelFilter::Error);
    }

    #[test]
    fn test_rejects_zero_threads() {
        let err = Settings::parse("[speedtest]\nthreads = 0\n").unwrap_err();
        assert!(matches!(err, SpeedError::Config(_)));
    }

    #[test]
    fn test_rejects_unknown_keys() {
        let err = Settings::parse("[database]\nuser = \"root\"\n").unwrap_err();
        assert!(matches!(err, SpeedError::TomlDe(_)));
    }
}
