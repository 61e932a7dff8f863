use chrono::{DateTime, NaiveDate, NaiveDateTime};
use crypto_mcp_common::{MarketDataError, Result};

/// Resolve a `startTime` / `endTime` argument into epoch milliseconds.
///
/// Accepts a numeric epoch-millisecond string (integer, decimal or exponent
/// notation), an RFC 3339 timestamp, a
/// zone-less `YYYY-MM-DDTHH:MM:SS` (read as UTC) or a bare `YYYY-MM-DD`
/// (UTC midnight).
pub fn parse_time_arg(raw: &str) -> Result<i64> {
    let raw = raw.trim();

    if let Ok(millis) = raw.parse::<i64>() {
        return Ok(millis);
    }
    // exponent and decimal forms such as `1.6725312e12`
    if let Some(millis) = raw
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && v.abs() < i64::MAX as f64)
    {
        return Ok(millis.trunc() as i64);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.timestamp_millis());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc().timestamp_millis());
        }
    }
    if let Some(midnight) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(midnight.and_utc().timestamp_millis());
    }

    Err(MarketDataError::validation(format!(
        "unrecognized time {:?}; expected ISO 8601 or epoch milliseconds",
        raw
    )))
}
