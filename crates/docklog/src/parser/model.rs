use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized severity levels.
///
/// Wire and filter code always sees the short code (`TRC`, `DBG`, …);
/// `parse` accepts both short codes and the long forms emitted by most
/// logging libraries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Level {
    pub fn code(&self) -> &'static str {
        match self {
            Level::Trace => "TRC",
            Level::Debug => "DBG",
            Level::Info => "INF",
            Level::Warn => "WRN",
            Level::Error => "ERR",
            Level::Fatal => "FATAL",
        }
    }

    /// Case-insensitive parse of short codes and long-form synonyms.
    pub fn parse(token: &str) -> Option<Level> {
        match token.to_ascii_uppercase().as_str() {
            "TRC" | "TRACE" => Some(Level::Trace),
            "DBG" | "DEBUG" => Some(Level::Debug),
            "INF" | "INFO" => Some(Level::Info),
            "WRN" | "WARN" | "WARNING" => Some(Level::Warn),
            "ERR" | "ERROR" => Some(Level::Error),
            "FATAL" => Some(Level::Fatal),
            _ => None,
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// One structured log entry, produced by [`super::parse`].
///
/// `raw` is always populated; everything else is best-effort. Multi-line
/// entries keep their fragments joined with `\n` in `raw`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub raw: String,
    /// Parsed event instant, when a recognized timestamp was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// The verbatim textual form of the timestamp (empty when absent).
    #[serde(default)]
    pub timestamp_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,
    /// Source location of the form `path:line`, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Human-readable prefix up to the first `key=` token.
    pub message: String,
    /// Key=value pairs from the fields region. Duplicate keys are last-wins.
    #[serde(default)]
    pub fields: HashMap<String, String>,
    /// Parsed JSON view when the whole line is a JSON object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_fields: Option<serde_json::Value>,
}

impl LogEntry {
    /// Level short code, or empty string when no level was parsed.
    pub fn level_code(&self) -> &'static str {
        self.level.map(|l| l.code()).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parse_short_and_long() {
        assert_eq!(Level::parse("INF"), Some(Level::Info));
        assert_eq!(Level::parse("info"), Some(Level::Info));
        assert_eq!(Level::parse("WARNING"), Some(Level::Warn));
        assert_eq!(Level::parse("error"), Some(Level::Error));
        assert_eq!(Level::parse("Trace"), Some(Level::Trace));
        assert_eq!(Level::parse("FATAL"), Some(Level::Fatal));
        assert_eq!(Level::parse("notice"), None);
        assert_eq!(Level::parse(""), None);
    }

    #[test]
    fn test_level_codes() {
        assert_eq!(Level::Warn.code(), "WRN");
        assert_eq!(Level::Fatal.code(), "FATAL");
        assert_eq!(Level::parse("ERROR").unwrap().code(), "ERR");
    }

    #[test]
    fn test_level_code_empty_when_absent() {
        let entry = LogEntry {
            raw: "x".to_string(),
            timestamp: None,
            timestamp_text: String::new(),
            level: None,
            file: None,
            message: "x".to_string(),
            fields: HashMap::new(),
            json_fields: None,
        };
        assert_eq!(entry.level_code(), "");
    }
}
