use chrono::SecondsFormat;

/// Job identifiers are opaque client-supplied (or generated) strings.
pub type JobId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Render a timestamp in the fixed-width ISO-8601 form used for storage
/// and log markers (`2025-01-01T12:00:00.000000Z`).
///
/// Fixed width keeps lexicographic order equal to chronological order, so
/// the store can compare timestamps as text.
pub fn format_timestamp(ts: Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}
