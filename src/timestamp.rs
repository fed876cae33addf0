use chrono::{DateTime, Utc};
use serde_json::Value;

/// Largest value still read as an epoch in milliseconds (13 digits).
/// Anything above it is assumed to already be `YYYYMMDDHHMMSS`.
pub const MAX_EPOCH_MILLIS: i64 = 9_999_999_999_999;

const PLAYER_TS_FORMAT: &str = "%Y%m%d%H%M%S";

/// Normalize a `ts` value coming from a query string or a command payload.
///
/// The leading integer of `raw` (optional sign, then digits) is read as
/// epoch milliseconds. When it is at or below `MAX_EPOCH_MILLIS` it becomes
/// the UTC `YYYYMMDDHHMMSS` form; otherwise `raw` is returned untouched.
pub fn normalize(raw: &str) -> String {
    leading_integer(raw)
        .and_then(format_epoch_millis)
        .unwrap_or_else(|| raw.to_string())
}

/// Same rule as [`normalize`] for JSON payloads, which may carry the
/// timestamp either as a number or as a string. Fractional numbers are
/// truncated toward zero.
pub fn normalize_value(value: &Value) -> String {
    match value {
        Value::String(text) => normalize(text),
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().and_then(truncate_millis))
            .and_then(format_epoch_millis)
            .unwrap_or_else(|| number.to_string()),
        other => other.to_string(),
    }
}

pub fn format_epoch_millis(millis: i64) -> Option<String> {
    if millis > MAX_EPOCH_MILLIS {
        return None;
    }
    let datetime = DateTime::<Utc>::from_timestamp_millis(millis)?;
    Some(datetime.format(PLAYER_TS_FORMAT).to_string())
}

fn truncate_millis(millis: f64) -> Option<i64> {
    let truncated = millis.trunc();
    // i64::MAX as f64 rounds up to 2^63, hence the strict upper bound.
    (truncated.is_finite() && truncated >= i64::MIN as f64 && truncated < i64::MAX as f64)
        .then(|| truncated as i64)
}

/// `parseInt`-style prefix: leading whitespace, an optional sign, then as
/// many ASCII digits as follow. `None` when there are no digits.
fn leading_integer(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let unsigned = trimmed.trim_start_matches(['+', '-']);
    let sign_len = trimmed.len() - unsigned.len();
    if sign_len > 1 {
        return None;
    }
    let digits = unsigned
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(unsigned.len());
    if digits == 0 {
        return None;
    }
    trimmed[..sign_len + digits].parse::<i64>().ok()
}
