//! Structured log entry parsing.
//!
//! [`parse`] turns one candidate entry string (possibly multi-line) into a
//! [`LogEntry`]. Parsing never fails: an unrecognizable line yields an entry
//! with only `raw` and `message` populated.
//!
//! Stages, in order: ANSI strip on a working copy; head tokenization
//! (timestamp, level, `path:line` source location — any order, each at most
//! once); optional `>` separator; message / fields split at the first
//! `<ident>=` token; fields tokenization; JSON object mode.

pub mod ansi;
pub mod fields;
pub mod model;
pub mod timestamp;

pub use model::{Level, LogEntry};

use std::collections::HashMap;

/// Window (bytes) in which a timestamp marks a line as a new entry.
pub const TIMESTAMP_PREFIX_WINDOW: usize = 40;

/// Parse one candidate entry string into a structured [`LogEntry`].
pub fn parse(raw: &str) -> LogEntry {
    let work = ansi::strip(raw);
    let work: &str = work.as_ref();

    let mut entry = LogEntry {
        raw: raw.to_string(),
        timestamp: None,
        timestamp_text: String::new(),
        level: None,
        file: None,
        message: String::new(),
        fields: HashMap::new(),
        json_fields: None,
    };

    let mut rest = work;

    // Head tokenization: timestamp, level, source location — any order,
    // each at most once.
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        if entry.timestamp.is_none() {
            if let Some(scan) = timestamp::scan(rest) {
                entry.timestamp_text = rest[..scan.len].to_string();
                entry.timestamp = Some(scan.instant);
                rest = &rest[scan.len..];
                continue;
            }
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let token = &rest[..end];
        if entry.level.is_none() {
            if let Some(level) = Level::parse(token.trim_end_matches(':')) {
                entry.level = Some(level);
                rest = &rest[end..];
                continue;
            }
        }
        if entry.file.is_none() && is_source_location(token) {
            entry.file = Some(token.to_string());
            rest = &rest[end..];
            continue;
        }
        break;
    }

    // Optional `>` prefix/message separator.
    rest = rest.trim_start();
    if let Some(after) = rest.strip_prefix('>') {
        rest = after;
    }

    // Message / fields boundary at the first key= token.
    match fields::find_fields_start(rest) {
        Some(at) => {
            entry.message = rest[..at].trim().to_string();
            for (key, value) in fields::parse_fields(&rest[at..]) {
                entry.fields.insert(key, value);
            }
        }
        None => entry.message = rest.trim().to_string(),
    }

    // Epoch timestamps carried as fields.
    if entry.timestamp.is_none() {
        for key in ["ts", "time"] {
            if let Some(value) = entry.fields.get(key) {
                let parsed = value
                    .parse::<i64>()
                    .ok()
                    .and_then(timestamp::parse_epoch)
                    .or_else(|| timestamp::parse_text(value));
                if let Some(instant) = parsed {
                    entry.timestamp = Some(instant);
                    entry.timestamp_text = value.clone();
                    break;
                }
            }
        }
    }

    apply_json_mode(work, &mut entry);

    entry
}

/// True when the line begins with a recognized level token (short code or
/// long form, optional trailing colon).
pub fn starts_with_level(line: &str) -> bool {
    if line.starts_with(char::is_whitespace) {
        return false;
    }
    let token = line.split_whitespace().next().unwrap_or("");
    !token.is_empty() && Level::parse(token.trim_end_matches(':')).is_some()
}

/// `<path>:<line>` where the path contains `/` and the line is numeric.
fn is_source_location(token: &str) -> bool {
    match token.rsplit_once(':') {
        Some((path, line)) => {
            path.contains('/') && !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

/// JSON mode: when the entire stripped line is a JSON object, keep the parsed
/// tree and use its conventional keys as defaults.
fn apply_json_mode(work: &str, entry: &mut LogEntry) {
    let trimmed = work.trim();
    if !trimmed.starts_with('{') {
        return;
    }
    let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(trimmed)
    else {
        return;
    };

    if let Some(msg) = first_str(&map, &["msg", "message"]) {
        entry.message = msg.to_string();
    }
    if entry.level.is_none() {
        if let Some(level) = first_str(&map, &["level", "lvl"]).and_then(Level::parse) {
            entry.level = Some(level);
        }
    }
    if entry.timestamp.is_none() {
        for key in ["time", "timestamp", "ts"] {
            let Some(value) = map.get(key) else { continue };
            let parsed = match value {
                serde_json::Value::String(s) => timestamp::parse_text(s),
                serde_json::Value::Number(n) => n.as_i64().and_then(timestamp::parse_epoch),
                _ => None,
            };
            if let Some(instant) = parsed {
                entry.timestamp = Some(instant);
                entry.timestamp_text = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                break;
            }
        }
    }

    entry.json_fields = Some(serde_json::Value::Object(map));
}

fn first_str<'a>(
    map: &'a serde_json::Map<String, serde_json::Value>,
    keys: &[&str],
) -> Option<&'a str> {
    keys.iter().find_map(|key| map.get(*key).and_then(|v| v.as_str()))
}
