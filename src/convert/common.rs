//! Helpers shared by every converter: timestamps, roles, ids, text extraction

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

/// Numbers below this are epoch seconds, at or above it epoch milliseconds
const EPOCH_SECONDS_CEILING: f64 = 10_000_000_000.0;

/// Current time as an ISO-8601 UTC string
pub fn now_iso() -> String {
    to_iso(Utc::now())
}

fn to_iso(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Normalize any timestamp-ish value to ISO-8601 UTC.
///
/// Accepts epoch seconds, epoch milliseconds, ISO strings and numeric strings.
/// Anything unparsable resolves to the current time; this never fails.
pub fn format_timestamp(value: &Value) -> String {
    parse_timestamp(value).map(to_iso).unwrap_or_else(now_iso)
}

/// Like `format_timestamp` for a field that may be missing
pub fn timestamp_or_now(value: Option<&Value>) -> String {
    value.map(format_timestamp).unwrap_or_else(now_iso)
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let parsed = match value {
        Value::Number(n) => n.as_f64().and_then(from_epoch),
        Value::String(s) => parse_timestamp_str(s.trim()),
        _ => None,
    }?;

    // Keep the output inside the four-digit-year range ISO-8601 expects
    if (0..=9999).contains(&parsed.year()) {
        Some(parsed)
    } else {
        None
    }
}

fn from_epoch(n: f64) -> Option<DateTime<Utc>> {
    if !n.is_finite() {
        return None;
    }
    let millis = if n.abs() < EPOCH_SECONDS_CEILING {
        n * 1000.0
    } else {
        n
    };
    if millis.abs() > i64::MAX as f64 {
        return None;
    }
    Utc.timestamp_millis_opt(millis.round() as i64).single()
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(n) = s.parse::<f64>() {
        return from_epoch(n);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Normalize a speaker role: case-insensitive, `human` becomes `user`,
/// missing or blank becomes `unknown`.
pub fn normalize_role(role: Option<&str>) -> String {
    let role = role.map(str::trim).unwrap_or_default().to_lowercase();
    match role.as_str() {
        "" => "unknown".to_string(),
        "human" => "user".to_string(),
        _ => role,
    }
}

/// Source of identifiers for records and messages that arrive without one
pub trait IdGenerator: Send + Sync {
    fn generate(&self, prefix: &str) -> String;
}

/// Random ids: `<prefix>_<uuid>`
#[derive(Debug, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self, prefix: &str) -> String {
        format!("{}_{}", prefix, Uuid::new_v4().simple())
    }
}

/// Deterministic ids: `<prefix>_1`, `<prefix>_2`, ...
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicUsize,
}

impl IdGenerator for SequentialIds {
    fn generate(&self, prefix: &str) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}_{}", prefix, n)
    }
}

// ============================================
// JSON ACCESS
// ============================================

/// Field lookup that treats JSON `null` as absent
pub fn field<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value.get(key).filter(|v| !v.is_null())
}

pub fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// Non-blank string field
pub fn text_field(value: &Value, key: &str) -> Option<String> {
    str_field(value, key)
        .filter(|s| !s.trim().is_empty())
        .map(String::from)
}

/// Text of a content value: a plain string, or the `\n`-joined text blocks of
/// an array (`{"type": "text", "text": ...}` or bare strings)
pub fn content_text(content: &Value) -> Option<String> {
    match content {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let texts: Vec<&str> = items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.as_str()),
                    Value::Object(_) => {
                        let typed_text = item
                            .get("type")
                            .and_then(Value::as_str)
                            .map_or(true, |t| t == "text");
                        if typed_text {
                            str_field(item, "text")
                        } else {
                            None
                        }
                    }
                    _ => None,
                })
                .collect();
            Some(texts.join("\n"))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assert_iso(s: &str) {
        assert!(s.ends_with('Z'), "{} does not end in Z", s);
        assert!(DateTime::parse_from_rfc3339(s).is_ok(), "{} is not ISO", s);
    }

    #[test]
    fn test_epoch_seconds_and_millis() {
        assert_eq!(
            format_timestamp(&json!(1700000000)),
            "2023-11-14T22:13:20.000Z"
        );
        assert_eq!(
            format_timestamp(&json!(1700000000123i64)),
            "2023-11-14T22:13:20.123Z"
        );
        assert_eq!(
            format_timestamp(&json!(1700000000.5)),
            "2023-11-14T22:13:20.500Z"
        );
    }

    #[test]
    fn test_zero_is_the_epoch() {
        assert_eq!(format_timestamp(&json!(0)), "1970-01-01T00:00:00.000Z");
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            format_timestamp(&json!("2024-03-01T10:00:00+02:00")),
            "2024-03-01T08:00:00.000Z"
        );
        assert_eq!(
            format_timestamp(&json!("1700000000")),
            "2023-11-14T22:13:20.000Z"
        );
        assert_eq!(
            format_timestamp(&json!("2024-03-01 10:00:00")),
            "2024-03-01T10:00:00.000Z"
        );
        assert_eq!(
            format_timestamp(&json!("2024-03-01")),
            "2024-03-01T00:00:00.000Z"
        );
    }

    #[test]
    fn test_format_timestamp_is_total() {
        for input in [
            json!(null),
            json!("garbage"),
            json!(""),
            json!(true),
            json!({"a": 1}),
            json!([1, 2]),
            json!(1e300),
            json!(-1e300),
            json!("NaN"),
        ] {
            assert_iso(&format_timestamp(&input));
        }
        assert_iso(&timestamp_or_now(None));
    }

    #[test]
    fn test_normalize_role() {
        assert_eq!(normalize_role(Some("Human")), "user");
        assert_eq!(normalize_role(Some("ASSISTANT")), "assistant");
        assert_eq!(normalize_role(Some("System")), "system");
        assert_eq!(normalize_role(Some("Tool")), "tool");
        assert_eq!(normalize_role(Some("  ")), "unknown");
        assert_eq!(normalize_role(None), "unknown");
    }

    #[test]
    fn test_normalize_role_is_idempotent() {
        for raw in ["Human", "USER", "assistant", "Tool", "", "weird Role"] {
            let once = normalize_role(Some(raw));
            assert_eq!(normalize_role(Some(&once)), once);
        }
    }

    #[test]
    fn test_sequential_ids() {
        let ids = SequentialIds::default();
        assert_eq!(ids.generate("conv"), "conv_1");
        assert_eq!(ids.generate("msg"), "msg_2");
    }

    #[test]
    fn test_content_text_keeps_text_blocks_only() {
        let content = json!([
            {"type": "text", "text": "one"},
            {"type": "tool_use", "name": "search"},
            "two",
            {"type": "text", "text": "three"}
        ]);
        assert_eq!(content_text(&content).unwrap(), "one\ntwo\nthree");
        assert_eq!(content_text(&json!("plain")).unwrap(), "plain");
        assert!(content_text(&json!(5)).is_none());
    }

    #[test]
    fn test_field_treats_null_as_absent() {
        let v = json!({"a": null, "b": 1});
        assert!(field(&v, "a").is_none());
        assert!(field(&v, "b").is_some());
    }
}
