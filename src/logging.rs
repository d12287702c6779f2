use crate::config::LogSettings;
use crate::error::Result;
use env_logger::{Builder, Target};
use std::fs::OpenOptions;
use std::io::Write;

/// Install the global logger.
/// 日志格式: "2024-01-01 12:00:00,123 INFO message"
/// 配置了 log_filename 时追加写入该文件, 否则写 stderr
pub fn init(settings: &LogSettings) -> Result<()> {
    let mut builder = Builder::new();
    builder
        .filter_level(settings.level_filter())
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {} {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
                record.level(),
                record.args()
            )
        });

    if let Some(ref path) = settings.log_filename {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder.try_init()?;
    Ok(())
}
