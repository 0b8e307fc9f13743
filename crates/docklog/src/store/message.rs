use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::parser::LogEntry;

/// Synthetic field carrying the level code, so levels are filterable the
/// same way as any other field.
pub const FIELD_LEVEL: &str = "_level";
/// Synthetic field carrying the raw text.
pub const FIELD_RAW: &str = "_raw";

/// The in-store view of a parsed entry.
///
/// `timestamp` is event time, falling back to ingest time when the payload
/// carried no recognizable timestamp. `fields` is the entry's field map plus
/// the synthetic `_level` and `_raw` copies.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub container_id: String,
    pub timestamp: DateTime<Utc>,
    pub entry: Arc<LogEntry>,
    pub fields: HashMap<String, String>,
}

impl StoredMessage {
    pub fn new(container_id: impl Into<String>, entry: LogEntry, ingest_time: DateTime<Utc>) -> Self {
        let timestamp = entry.timestamp.unwrap_or(ingest_time);
        let mut fields = entry.fields.clone();
        fields.insert(FIELD_LEVEL.to_string(), entry.level_code().to_string());
        fields.insert(FIELD_RAW.to_string(), entry.raw.clone());
        StoredMessage {
            container_id: container_id.into(),
            timestamp,
            entry: Arc::new(entry),
            fields,
        }
    }

    pub fn message(&self) -> &str {
        &self.entry.message
    }

    /// Level short code, empty when the entry carried none.
    pub fn level_code(&self) -> &str {
        self.fields.get(FIELD_LEVEL).map(String::as_str).unwrap_or("")
    }
}
