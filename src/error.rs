use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpeedError {
    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Logger setup failed: {0}")]
    Logger(#[from] log::SetLoggerError),

    #[error("Unknown result source: {0}")]
    UnknownSource(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Speed test failed: {0}")]
    Measurement(String),
}

pub type Result<T> = std::result::Result<T, SpeedError>;
