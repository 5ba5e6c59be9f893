use chrono::{DateTime, SecondsFormat};

use crate::types::TimestampMs;

/// Текущее Unix-время в миллисекундах.
pub fn now_ms() -> TimestampMs {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Unix ms → RFC 3339 / ISO-8601 в UTC с миллисекундами
/// (`2024-01-01T00:00:00.000Z`). `None` если ms вне диапазона chrono.
pub fn format_iso8601(ms: TimestampMs) -> Option<String> {
    DateTime::from_timestamp_millis(ms).map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}
