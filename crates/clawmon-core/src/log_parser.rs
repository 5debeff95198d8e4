use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use crate::log_event::{LogEvent, LogLevel, SOURCE_GATEWAY};

const MESSAGE_KEYS: [&str; 2] = ["msg", "message"];
const TIME_KEYS: [&str; 2] = ["time", "timestamp"];
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parses one line from the follow command's standard output. Never fails.
pub fn parse_log_line(line: &str) -> LogEvent {
    parse_log_line_at(line, Utc::now())
}

/// Same as [`parse_log_line`], with `received_at` used whenever the line carries no usable time.
pub fn parse_log_line_at(line: &str, received_at: DateTime<Utc>) -> LogEvent {
    if let Some(event) = parse_structured(line, received_at) {
        return event;
    }
    if let Some(event) = parse_bracketed(line, received_at) {
        return event;
    }
    LogEvent {
        timestamp: received_at,
        level: LogLevel::Info,
        source: SOURCE_GATEWAY.to_string(),
        message: line.trim().to_string(),
        raw: line.to_string(),
    }
}

fn parse_structured(line: &str, received_at: DateTime<Utc>) -> Option<LogEvent> {
    let trimmed = line.trim_start();
    if !trimmed.starts_with('{') {
        return None;
    }
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) else {
        return None;
    };

    let level = string_field(&map, &["level"])
        .and_then(LogLevel::from_label)
        .unwrap_or_default();
    let message = string_field(&map, &MESSAGE_KEYS)
        .map(str::to_string)
        .unwrap_or_else(|| line.trim().to_string());
    let timestamp = string_field(&map, &TIME_KEYS)
        .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
        .map(|value| value.with_timezone(&Utc))
        .unwrap_or(received_at);
    let source = string_field(&map, &["source"]).unwrap_or(SOURCE_GATEWAY);

    Some(LogEvent {
        timestamp,
        level,
        source: source.to_string(),
        message,
        raw: line.to_string(),
    })
}

/// First non-empty string value among `keys`, in key order.
fn string_field<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| map.get(*key).and_then(Value::as_str))
        .find(|value| !value.is_empty())
}

fn parse_bracketed(line: &str, received_at: DateTime<Utc>) -> Option<LogEvent> {
    let trimmed = line.trim();
    let open = trimmed.find('[')?;
    let close = open + trimmed[open..].find(']')?;

    let tag = &trimmed[open + 1..close];
    let level = LogLevel::from_label(tag).unwrap_or_default();
    let timestamp = parse_prefix_timestamp(trimmed[..open].trim()).unwrap_or(received_at);

    Some(LogEvent {
        timestamp,
        level,
        source: SOURCE_GATEWAY.to_string(),
        message: trimmed[close + 1..].trim().to_string(),
        raw: line.to_string(),
    })
}

fn parse_prefix_timestamp(prefix: &str) -> Option<DateTime<Utc>> {
    if prefix.is_empty() {
        return None;
    }
    if let Ok(value) = DateTime::parse_from_rfc3339(prefix) {
        return Some(value.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(prefix, format).ok())
        .and_then(|naive| Local.from_local_datetime(&naive).single())
        .map(|value| value.with_timezone(&Utc))
}
