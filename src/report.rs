use crate::types::StoredMeasurement;
use chrono::{DateTime, FixedOffset, Local, Offset, TimeZone, Utc};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// UTC offset of the machine's local timezone at `at` (DST aware).
pub fn local_offset(at: DateTime<Utc>) -> FixedOffset {
    Local.offset_from_utc_datetime(&at.naive_utc()).fix()
}

/// bits/s -> mbit/s, rounded to 2 decimals (halves go to the even digit)
pub fn to_mbps(bits_per_sec: f64) -> f64 {
    (bits_per_sec / 1_000_000.0 * 100.0).round_ties_even() / 100.0
}

/// One `show-all` line:
/// `{id} | {local time} | download: {mbps} mbit/s | upload: {mbps} mbit/s | ping: {ping}`
///
/// Floats use `{:?}` so whole values keep their decimal point (`50.0`, not `50`).
pub fn format_measurement(m: &StoredMeasurement, offset: FixedOffset) -> String {
    let local = m.added_at.with_timezone(&offset);
    format!(
        "{} | {} | download: {:?} mbit/s | upload: {:?} mbit/s | ping: {:?}",
        m.id,
        local.format(TIMESTAMP_FORMAT),
        to_mbps(m.download),
        to_mbps(m.upload),
        m.ping
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(added_at: &str) -> StoredMeasurement {
        StoredMeasurement {
            id: 7,
            server_id: 1,
            client_id: 1,
            added_at: added_at.parse().unwrap(),
            download: 50_000_000.0,
            upload: 12_345_678.0,
            ping: 12.5,
            timestamp: "2023-01-01T00:00:00Z".to_string(),
            bytes_sent: 0,
            bytes_received: 0,
            share: None,
        }
    }

    #[test]
    fn test_mbps_rounding() {
        assert_eq!(to_mbps(50_000_000.0), 50.0);
        assert_eq!(to_mbps(12_345_678.0), 12.35);
        assert_eq!(to_mbps(0.0), 0.0);
        assert_eq!(to_mbps(125_000.0), 0.12);
        assert_eq!(to_mbps(375_000.0), 0.38);
    }

    #[test]
    fn test_format_line() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let line = format_measurement(&stored("2023-01-01T00:00:00Z"), offset);
        assert_eq!(
            line,
            "7 | 2023-01-01 02:00:00 | download: 50.0 mbit/s | upload: 12.35 mbit/s | ping: 12.5"
        );
    }

    #[test]
    fn test_negative_offset_crosses_midnight() {
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        let line = format_measurement(&stored("2023-01-01T03:30:00Z"), offset);
        assert!(line.starts_with("7 | 2022-12-31 22:30:00 | "));
    }
}
