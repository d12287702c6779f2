pub mod cloudflare;

use crate::config::SpeedtestSettings;
use crate::error::{Result, SpeedError};
use crate::traits::ResultSource;

pub const SUPPORTED_SOURCES: &[&str] = &["cloudflare"];

pub fn get_source(settings: &SpeedtestSettings) -> Result<Box<dyn ResultSource>> {
    match settings.source.to_lowercase().as_str() {
        "cloudflare" => Ok(Box::new(cloudflare::CloudflareSource::new(settings)?)),
        _ => Err(SpeedError::UnknownSource(format!(
            "Unsupported source: '{}'. Available: {}",
            settings.source,
            SUPPORTED_SOURCES.join(", ")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_source() {
        let mut settings = SpeedtestSettings::default();
        let source = get_source(&settings).map(|s| s.name());
        assert!(matches!(source, Ok("cloudflare")));

        settings.source = "speedtest.net".to_string();
        assert!(matches!(get_source(&settings), Err(SpeedError::UnknownSource(_))));
    }
}
